//! 🔄 Rollover: decide whether a write index has had enough.
//!
//! ```text
//!   conditions { max_age?, max_docs?, max_size? }      stats { age, doc_count, size }
//!                        \                                  /
//!                         └──────── evaluate() ────────────┘
//!                                      │
//!                        any threshold reached? → roll
//! ```
//!
//! Thresholds are inclusive (`>=`) and OR-ed: a single met condition is enough. The evaluator
//! never does I/O; [`task`] fetches the stats, asks here, and acts on the answer.

use std::fmt;
use std::time::Duration;

use crate::entity::{AddressingMode, EntityDescriptor};
use crate::errors::ConfigurationError;
use crate::units::{ByteSize, format_duration};

pub mod task;

pub use task::{RolloverOutcome, RolloverTrigger};

/// 📏 The thresholds. At least one is set on every rollover-backed descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RolloverConditions {
    pub max_age: Option<Duration>,
    /// `Some(0)` never happens: the builder reads zero as unset.
    pub max_docs: Option<u64>,
    pub max_size: Option<ByteSize>,
}

impl RolloverConditions {
    pub fn is_empty(&self) -> bool {
        self.max_age.is_none() && self.max_docs.is_none() && self.max_size.is_none()
    }

    /// ⚖️ Every configured condition the stats meet. Empty means stay put.
    pub fn met_by(&self, stats: &IndexStats) -> Vec<RolloverCondition> {
        let mut met = Vec::new();
        if let Some(max_age) = self.max_age.filter(|max_age| stats.age >= *max_age) {
            met.push(RolloverCondition::MaxAge(max_age));
        }
        if let Some(max_docs) = self.max_docs.filter(|max_docs| stats.doc_count >= *max_docs) {
            met.push(RolloverCondition::MaxDocs(max_docs));
        }
        if let Some(max_size) = self.max_size.filter(|max_size| stats.size_bytes >= max_size.bytes()) {
            met.push(RolloverCondition::MaxSize(max_size));
        }
        met
    }
}

/// 📊 Live numbers for one physical index, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub age: Duration,
    pub doc_count: u64,
    pub size_bytes: u64,
}

/// 🎯 One threshold that was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverCondition {
    MaxAge(Duration),
    MaxDocs(u64),
    MaxSize(ByteSize),
}

impl fmt::Display for RolloverCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloverCondition::MaxAge(age) => write!(f, "max_age={}", format_duration(*age)),
            RolloverCondition::MaxDocs(docs) => write!(f, "max_docs={docs}"),
            RolloverCondition::MaxSize(size) => write!(f, "max_size={size}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RolloverDecision {
    pub should: bool,
    pub conditions_met: Vec<RolloverCondition>,
}

/// 🔍 Should `descriptor`'s current write index roll, given `stats`?
pub fn evaluate(descriptor: &EntityDescriptor, stats: &IndexStats) -> Result<RolloverDecision, ConfigurationError> {
    let AddressingMode::RolloverBacked { conditions, .. } = descriptor.mode() else {
        return Err(ConfigurationError::NotRolloverBacked {
            document_type: descriptor.document_type().to_string(),
        });
    };
    let conditions_met = conditions.met_by(stats);
    Ok(RolloverDecision {
        should: !conditions_met.is_empty(),
        conditions_met,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DocumentTypeConfig, RolloverConfig};
    use crate::placeholders::MapEnvironment;

    const DAY: u64 = 86_400;

    fn descriptor(rollover: RolloverConfig) -> EntityDescriptor {
        EntityDescriptor::build(
            &DocumentTypeConfig::new("Answer").rollover(rollover),
            &MapEnvironment::default(),
        )
        .expect("rollover type should build")
    }

    #[test]
    fn the_one_where_one_doc_over_the_limit_is_enough() {
        let answer = descriptor(RolloverConfig::new("answers").max_docs(100));
        let stats = IndexStats {
            doc_count: 101,
            ..IndexStats::default()
        };
        let decision = evaluate(&answer, &stats).expect("rollover backed");
        assert!(decision.should);
        assert_eq!(decision.conditions_met, vec![RolloverCondition::MaxDocs(100)]);
    }

    #[test]
    fn the_one_where_age_alone_wins_because_it_is_or_not_and() {
        let answer = descriptor(RolloverConfig::new("answers").max_docs(100).max_age("30d"));
        let stats = IndexStats {
            doc_count: 50,
            age: Duration::from_secs(31 * DAY),
            size_bytes: 0,
        };
        let decision = evaluate(&answer, &stats).expect("rollover backed");
        assert!(decision.should);
        assert_eq!(
            decision.conditions_met,
            vec![RolloverCondition::MaxAge(Duration::from_secs(30 * DAY))]
        );
    }

    #[test]
    fn the_one_where_nothing_is_reached_and_nothing_happens() {
        let answer = descriptor(RolloverConfig::new("answers").max_docs(100).max_size("1gb"));
        let stats = IndexStats {
            doc_count: 99,
            size_bytes: ByteSize::mb(1023).bytes(),
            age: Duration::from_secs(365 * DAY),
        };
        let decision = evaluate(&answer, &stats).expect("rollover backed");
        assert!(!decision.should);
        assert!(decision.conditions_met.is_empty());

        let at_the_line = IndexStats {
            size_bytes: ByteSize::gb(1).bytes(),
            ..stats
        };
        assert!(evaluate(&answer, &at_the_line).expect("rollover backed").should, ">= is inclusive");
    }

    #[test]
    fn the_one_where_fixed_types_cannot_be_asked() {
        let fixed = EntityDescriptor::build(&DocumentTypeConfig::new("Question"), &MapEnvironment::default())
            .expect("fixed type should build");
        assert!(matches!(
            evaluate(&fixed, &IndexStats::default()),
            Err(ConfigurationError::NotRolloverBacked { .. })
        ));
        assert_eq!(RolloverCondition::MaxDocs(2).to_string(), "max_docs=2");
        assert_eq!(
            RolloverCondition::MaxAge(Duration::from_secs(30 * DAY)).to_string(),
            "max_age=30d"
        );
    }
}
