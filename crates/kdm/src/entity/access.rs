//! 🎭 Role field access on JSON documents.
//!
//! After a write the engine hands back an id and a version; after a search it hands back a
//! score and the concrete index. The surrounding layer copies those into the document through
//! these setters. Each setter is a no-op (returning `false`) when the type has no such role.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};

use super::{AddressingMode, DocumentRelation, EntityDescriptor, FieldRole};

impl EntityDescriptor {
    /// 🆔 The document's identity, stringified. Numbers are fine ids too.
    pub fn identity_of(&self, document: &Value) -> Option<String> {
        self.role_value(FieldRole::Identity, document).and_then(scalar_string)
    }

    pub fn set_identity(&self, document: &mut Value, id: &str) -> bool {
        self.assign_role(FieldRole::Identity, document, json!(id))
    }

    pub fn version_of(&self, document: &Value) -> Option<i64> {
        self.role_value(FieldRole::Version, document).and_then(Value::as_i64)
    }

    pub fn set_version(&self, document: &mut Value, version: i64) -> bool {
        self.assign_role(FieldRole::Version, document, json!(version))
    }

    pub fn set_score(&self, document: &mut Value, score: f64) -> bool {
        self.assign_role(FieldRole::Score, document, json!(score))
    }

    pub fn set_index_name(&self, document: &mut Value, index: &str) -> bool {
        self.assign_role(FieldRole::IndexName, document, json!(index))
    }

    pub fn parent_id_of(&self, document: &Value) -> Option<String> {
        self.role_value(FieldRole::ParentId, document).and_then(scalar_string)
    }

    /// 🧭 Shard routing for child documents: the value at the relation's routing field.
    pub fn routing_of(&self, document: &Value) -> Option<String> {
        match &self.relation {
            DocumentRelation::Child { routing, .. } => routing.lookup(document).and_then(scalar_string),
            _ => None,
        }
    }

    /// 📅 The instant that picks a time bucket, read from the configured time field.
    ///
    /// Accepts RFC 3339 timestamps, bare `YYYY-MM-DD` dates (midnight UTC) and epoch
    /// milliseconds. Anything else reads as "no time value" and the router falls back to now.
    pub fn time_value_of(&self, document: &Value) -> Option<DateTime<Utc>> {
        let AddressingMode::TimeBased {
            time_field: Some(field),
            ..
        } = &self.mode
        else {
            return None;
        };
        match field.lookup(document)? {
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .map(|instant| instant.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()?
                        .and_hms_opt(0, 0, 0)
                        .map(|naive| naive.and_utc())
                }),
            Value::Number(millis) => DateTime::from_timestamp_millis(millis.as_i64()?),
            _ => None,
        }
    }

    fn role_value<'a>(&self, role: FieldRole, document: &'a Value) -> Option<&'a Value> {
        self.role_field(role)?.lookup(document)
    }

    fn assign_role(&self, role: FieldRole, document: &mut Value, value: Value) -> bool {
        self.role_field(role)
            .is_some_and(|path| path.assign(document, value))
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
