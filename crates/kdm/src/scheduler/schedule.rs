//! ⏰ Recurrence expressions for triggers.
//!
//! Two flavours:
//! - fixed interval: `@every 1h`, `every 30s`, a bare `15m`, or `@minutely`. The first firing
//!   comes one interval after start.
//! - calendar (cron): `0 */15 * * * *` with seconds, the classic five-field `*/15 * * * *`, or
//!   `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly`. Firings land on the wall-clock
//!   instants the expression names, in UTC.
//!
//! Either can carry an initial delay that replaces the wait before the first firing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::ConfigurationError;
use crate::units::{format_duration, parse_duration};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Recurrence {
    /// Never zero: [`Schedule::every`] refuses it.
    Every(Duration),
    Cron(Arc<cron::Schedule>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    recurrence: Recurrence,
    initial_delay: Option<Duration>,
}

impl Schedule {
    /// 🐢 Once a minute. The fallback when nobody configured anything.
    pub const MINUTELY: Schedule = Schedule {
        recurrence: Recurrence::Every(Duration::from_secs(60)),
        initial_delay: None,
    };

    /// 🔁 A fixed interval. Zero is refused: a job that fires continuously is a spin loop.
    pub fn every(interval: Duration) -> Result<Self, ConfigurationError> {
        if interval.is_zero() {
            return Err(ConfigurationError::InvalidSchedule {
                value: format!("@every {}", format_duration(interval)),
            });
        }
        Ok(Self {
            recurrence: Recurrence::Every(interval),
            initial_delay: None,
        })
    }

    /// 📅 A cron expression, six or seven fields (seconds first) or the classic five.
    pub fn cron(expression: &str) -> Result<Self, ConfigurationError> {
        let trimmed = expression.trim();
        let normalized = match trimmed.split_whitespace().count() {
            5 => format!("0 {trimmed}"),
            _ => trimmed.to_string(),
        };
        let parsed = cron::Schedule::from_str(&normalized).map_err(|_| ConfigurationError::InvalidSchedule {
            value: expression.to_string(),
        })?;
        Ok(Self {
            recurrence: Recurrence::Cron(Arc::new(parsed)),
            initial_delay: None,
        })
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// The fixed interval, if this is an interval schedule.
    pub fn interval(&self) -> Option<Duration> {
        match &self.recurrence {
            Recurrence::Every(interval) => Some(*interval),
            Recurrence::Cron(_) => None,
        }
    }

    pub fn initial_delay(&self) -> Option<Duration> {
        self.initial_delay
    }

    /// ⏭️ How long after `now` the next regular firing is due. `None` when a cron expression
    /// has no firings left (a year in the past, say).
    pub fn delay_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match &self.recurrence {
            Recurrence::Every(interval) => Some(*interval),
            Recurrence::Cron(expression) => {
                let next = expression.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }

    /// How long after start (at `now`) the first firing happens.
    pub fn first_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.initial_delay.or_else(|| self.delay_after(now))
    }
}

impl FromStr for Schedule {
    type Err = ConfigurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigurationError::InvalidSchedule {
            value: raw.to_string(),
        };
        let expression = raw.trim().to_ascii_lowercase();
        match expression.as_str() {
            "" => Err(invalid()),
            "@minutely" => Schedule::every(Duration::from_secs(60)),
            "@midnight" => Schedule::cron("@daily"),
            "@annually" => Schedule::cron("@yearly"),
            "@hourly" | "@daily" | "@weekly" | "@monthly" | "@yearly" => Schedule::cron(&expression),
            // 📅 anything with field separators is a calendar expression
            other if other.split_whitespace().count() >= 5 => Schedule::cron(raw),
            other => {
                let amount = other
                    .strip_prefix("@every")
                    .or_else(|| other.strip_prefix("every"))
                    .unwrap_or(other)
                    .trim();
                let interval = parse_duration(amount).map_err(|_| invalid())?;
                Schedule::every(interval).map_err(|_| invalid())
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.recurrence {
            Recurrence::Every(interval) => write!(f, "@every {}", format_duration(*interval))?,
            Recurrence::Cron(expression) => write!(f, "cron '{}'", expression.source())?,
        }
        if let Some(delay) = self.initial_delay {
            write!(f, " (first after {})", format_duration(delay))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).single().expect("valid time")
    }

    #[test]
    fn the_one_where_every_spelling_means_the_same_hour() {
        let hourly = Schedule::every(Duration::from_secs(3_600)).expect("non-zero");
        for expression in ["@every 1h", "every 1h", "1h", "  @EVERY 60m "] {
            assert_eq!(expression.parse::<Schedule>(), Ok(hourly.clone()), "{expression}");
        }
        assert_eq!(
            "@minutely".parse::<Schedule>().map(|s| s.interval()),
            Ok(Some(Duration::from_secs(60)))
        );
        assert_eq!(Schedule::MINUTELY.interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn the_one_where_zero_and_nonsense_are_turned_away() {
        assert!(matches!(
            Schedule::every(Duration::ZERO),
            Err(ConfigurationError::InvalidSchedule { .. })
        ));
        for expression in ["@every 0s", "0ms", "@yearly-ish", "", "61 * * * *", "* * * * * * * *"] {
            assert!(
                matches!(expression.parse::<Schedule>(), Err(ConfigurationError::InvalidSchedule { .. })),
                "{expression}"
            );
        }
    }

    #[test]
    fn the_one_where_cron_lands_on_the_wall_clock() {
        // 🕰️ five fields, seconds implied
        let quarter_hours: Schedule = "*/15 * * * *".parse().expect("classic cron");
        assert_eq!(quarter_hours.interval(), None);
        assert_eq!(quarter_hours.delay_after(at(10, 7, 30)), Some(Duration::from_secs(7 * 60 + 30)));
        assert_eq!(quarter_hours.delay_after(at(10, 15, 0)), Some(Duration::from_secs(15 * 60)));

        // 🕰️ six fields, seconds explicit
        let seconds: Schedule = "30 0 3 * * *".parse().expect("cron with seconds");
        assert_eq!(seconds.delay_after(at(2, 0, 0)), Some(Duration::from_secs(3_600 + 30)));

        let hourly: Schedule = "@hourly".parse().expect("shorthand");
        assert_eq!(hourly.delay_after(at(10, 59, 0)), Some(Duration::from_secs(60)));
        assert_eq!(hourly.to_string(), "cron '@hourly'");
    }

    #[test]
    fn the_one_where_a_cron_in_the_past_has_nothing_left() {
        let long_gone = Schedule::cron("0 0 0 1 1 * 2020").expect("seven fields, with a year");
        assert_eq!(long_gone.delay_after(at(12, 0, 0)), None);
        assert_eq!(long_gone.first_delay(at(12, 0, 0)), None);
    }

    #[test]
    fn the_one_where_the_first_firing_waits_one_interval_by_default() {
        let now = at(12, 0, 0);
        let schedule = Schedule::every(Duration::from_secs(30)).expect("non-zero");
        assert_eq!(schedule.first_delay(now), Some(Duration::from_secs(30)));
        let eager = schedule.with_initial_delay(Duration::ZERO);
        assert_eq!(eager.first_delay(now), Some(Duration::ZERO));
        assert_eq!(eager.to_string(), "@every 30s (first after 0s)");
    }
}
