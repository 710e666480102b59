//! 📏 Units: durations and byte sizes, written the way humans write them in config files.
//!
//! `30d`, `12h`, `15m`, `30s`, `250ms` for time. `512b`, `10kb`, `512mb`, `5gb`, `1tb` for bytes.
//! Binary multiples (1kb = 1024 bytes), which is what the engine means too.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::errors::ConfigurationError;

/// ⏱️ Parse a compact duration like `30d` or `250ms`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigurationError> {
    let invalid = || ConfigurationError::InvalidDuration {
        value: raw.to_string(),
    };
    let trimmed = raw.trim().to_ascii_lowercase();
    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = trimmed.split_at(split_at);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let seconds_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(amount)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// 🖨️ The inverse, for log lines and tables. Picks the largest unit that divides evenly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs >= size && secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

/// 📦 A byte count that deserializes from `5gb` as happily as from `5368709120`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

const KIB: u64 = 1024;

impl ByteSize {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn kb(n: u64) -> Self {
        Self(n * KIB)
    }

    pub fn mb(n: u64) -> Self {
        Self(n * KIB * KIB)
    }

    pub fn gb(n: u64) -> Self {
        Self(n * KIB * KIB * KIB)
    }
}

impl FromStr for ByteSize {
    type Err = ConfigurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigurationError::InvalidByteSize {
            value: raw.to_string(),
        };
        let trimmed = raw.trim().to_ascii_lowercase();
        let split_at = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split_at);
        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        let multiplier = match unit.trim() {
            "" | "b" => 1,
            "kb" | "k" => KIB,
            "mb" | "m" => KIB.pow(2),
            "gb" | "g" => KIB.pow(3),
            "tb" | "t" => KIB.pow(4),
            _ => return Err(invalid()),
        };
        amount
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (unit, size) in [("tb", KIB.pow(4)), ("gb", KIB.pow(3)), ("mb", KIB.pow(2)), ("kb", KIB)] {
            if self.0 >= size && self.0 % size == 0 {
                return write!(f, "{}{unit}", self.0 / size);
            }
        }
        write!(f, "{}b", self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // 🔢 numbers are bytes, strings get parsed, anything else gets a stern look
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Bytes(n) => Ok(ByteSize(n)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_durations_speak_human() {
        assert_eq!(parse_duration("30d").unwrap(), Duration::from_secs(30 * 86_400));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(12 * 3_600));
        assert_eq!(parse_duration(" 15m ").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("45S").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn the_one_where_nonsense_durations_get_rejected() {
        for nonsense in ["", "d", "30", "thirty days", "5w", "-3h"] {
            assert!(
                matches!(parse_duration(nonsense), Err(ConfigurationError::InvalidDuration { .. })),
                "'{nonsense}' should not parse"
            );
        }
    }

    #[test]
    fn the_one_where_durations_print_in_their_biggest_coat() {
        assert_eq!(format_duration(Duration::from_secs(30 * 86_400)), "30d");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(7_200)), "2h");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1500ms");
    }

    #[test]
    fn the_one_where_byte_sizes_are_binary_like_the_engine() {
        assert_eq!("5gb".parse::<ByteSize>().unwrap(), ByteSize::gb(5));
        assert_eq!("512MB".parse::<ByteSize>().unwrap(), ByteSize::mb(512));
        assert_eq!("10kb".parse::<ByteSize>().unwrap().bytes(), 10_240);
        assert_eq!("42".parse::<ByteSize>().unwrap().bytes(), 42);
        assert!("5 furlongs".parse::<ByteSize>().is_err());
        assert_eq!(ByteSize::gb(5).to_string(), "5gb");
    }

    #[test]
    fn the_one_where_byte_sizes_deserialize_from_either_shape() {
        #[derive(Deserialize)]
        struct Holder {
            size: ByteSize,
        }
        let from_text: Holder = serde_json::from_str(r#"{"size":"1mb"}"#).unwrap();
        let from_number: Holder = serde_json::from_str(r#"{"size":1048576}"#).unwrap();
        assert_eq!(from_text.size, from_number.size);
    }
}
