//! 🧭 Index routing: which name does a read, a write or a rollover target?
//!
//! | mode            | read                                   | write                          |
//! |-----------------|----------------------------------------|--------------------------------|
//! | fixed           | alias, else the index                  | the index                      |
//! | time-based      | alias, else the pattern with `*` holes | pattern expanded for the doc   |
//! | rollover-backed | read alias, alias, else `{prefix}-*`   | the write alias, always        |
//!
//! Rollover targets follow `{prefix}-000001`, `{prefix}-000002`, ... A target that already
//! exists is a [`NamingCollisionError`], never a reason to improvise another name.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use serde_json::Value;

use crate::clock::Clock;
use crate::entity::{AddressingMode, EntityDescriptor};
use crate::errors::{ConfigurationError, NamingCollisionError, RolloverAttemptError};

/// Zero padding of rollover generations.
const GENERATION_WIDTH: usize = 6;

#[derive(Debug, Clone)]
pub struct IndexRouter {
    clock: Arc<dyn Clock>,
}

impl IndexRouter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// 🔍 Where queries go. A pure function of the descriptor.
    pub fn resolve_for_read(&self, descriptor: &EntityDescriptor) -> String {
        match descriptor.mode() {
            AddressingMode::Fixed { index } => descriptor.alias().unwrap_or(index).to_string(),
            AddressingMode::TimeBased { pattern, .. } => descriptor
                .alias()
                .map(str::to_string)
                .unwrap_or_else(|| wildcard_pattern(pattern)),
            AddressingMode::RolloverBacked { alias, .. } => alias
                .read_alias
                .as_deref()
                .or(descriptor.alias())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-*", alias.index_prefix)),
        }
    }

    /// ✍️ Where `instance` gets written.
    ///
    /// Time-based names come from the instance's time field when it has a usable one, else
    /// from the clock. Same instance, same day: same name, which is what makes retries safe.
    pub fn resolve_for_write(&self, descriptor: &EntityDescriptor, instance: Option<&Value>) -> String {
        match descriptor.mode() {
            AddressingMode::Fixed { index } => index.clone(),
            AddressingMode::TimeBased { pattern, .. } => {
                let instant = instance
                    .and_then(|document| descriptor.time_value_of(document))
                    .unwrap_or_else(|| self.clock.now());
                let mut name = String::new();
                // 🛡️ the builder already rejected patterns chrono cannot format
                match write!(name, "{}", instant.format(pattern)) {
                    Ok(()) => name,
                    Err(_) => descriptor.index_name().to_string(),
                }
            }
            AddressingMode::RolloverBacked { alias, .. } => alias.write_alias.clone(),
        }
    }

    /// 🔢 The index that replaces `current` as write index.
    ///
    /// `current` is expected to look like `{prefix}-NNNNNN`; its generation plus one is next.
    /// An index outside the scheme (a hand-made first index, say) hands over to generation one.
    pub fn resolve_rollover_target(
        &self,
        descriptor: &EntityDescriptor,
        current: &str,
        existing: &[String],
    ) -> Result<String, RolloverAttemptError> {
        let AddressingMode::RolloverBacked { alias, .. } = descriptor.mode() else {
            return Err(ConfigurationError::NotRolloverBacked {
                document_type: descriptor.document_type().to_string(),
            }
            .into());
        };

        let (generation, width) = generation_of(&alias.index_prefix, current)
            .map(|(generation, width)| (generation.saturating_add(1), width))
            .unwrap_or((1, GENERATION_WIDTH));
        let target = format!("{}-{generation:0width$}", alias.index_prefix);

        if target == current || existing.iter().any(|index| index == &target) {
            return Err(NamingCollisionError {
                document_type: descriptor.document_type().to_string(),
                index: target,
            }
            .into());
        }
        Ok(target)
    }

    /// 🌱 The very first index of a rollover series.
    pub fn initial_rollover_index(&self, descriptor: &EntityDescriptor) -> Option<String> {
        match descriptor.mode() {
            AddressingMode::RolloverBacked { alias, .. } => {
                Some(format!("{}-{:0width$}", alias.index_prefix, 1, width = GENERATION_WIDTH))
            }
            _ => None,
        }
    }
}

/// `answers-000041` with prefix `answers` → (41, 6)
fn generation_of(prefix: &str, index: &str) -> Option<(u64, usize)> {
    let digits = index.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, digits.len().max(GENERATION_WIDTH)))
}

/// `orders-%Y.%m.%d` → `orders-*`. Neighbouring specifiers collapse into a single star.
fn wildcard_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for item in StrftimeItems::new(pattern) {
        match item {
            Item::Literal(text) => out.push_str(text),
            Item::OwnedLiteral(text) => out.push_str(&text),
            Item::Space(text) => out.push_str(text),
            Item::OwnedSpace(text) => out.push_str(&text),
            _ => {
                // 🌟 numeric separators between specifiers fold into the star too
                let trimmed = out.trim_end_matches(['.', '-', '_', '/', ':']);
                if trimmed.ends_with('*') {
                    out.truncate(trimmed.len());
                } else {
                    out.push('*');
                }
            }
        }
    }
    out
}
