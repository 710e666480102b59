//! 🔁 Object mapping: records as the application writes them ↔ documents as the engine stores them.
//!
//! The application speaks language field names (`question_id`), the engine speaks engine names
//! (`questionId`). The mapper renames in both directions using the descriptor's field tree and
//! leaves anything it does not know about untouched.

use std::fmt::Debug;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::entity::{EntityDescriptor, FieldDescriptor};

pub trait ObjectMapper: Send + Sync + Debug {
    /// ➡️ Application record → engine document.
    fn to_engine(&self, descriptor: &EntityDescriptor, instance: &Value) -> Result<Value>;

    /// ⬅️ Engine document → application record.
    fn from_engine(&self, descriptor: &EntityDescriptor, document: &Value) -> Result<Value>;

    /// 📦 Record → request payload bytes.
    fn to_wire_format(&self, descriptor: &EntityDescriptor, instance: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.to_engine(descriptor, instance)?)
            .context("💀 The document would not serialize. It has trust issues.")
    }

    /// 📦 Response payload bytes → record.
    fn from_wire_format(&self, descriptor: &EntityDescriptor, bytes: &[u8]) -> Result<Value> {
        let document: Value = serde_json::from_slice(bytes).with_context(|| {
            format!(
                "💀 {} bytes came back for '{}' and none of them were JSON",
                bytes.len(),
                descriptor.document_type()
            )
        })?;
        self.from_engine(descriptor, &document)
    }
}

/// 🦆 The stock mapper: JSON in, JSON out, names translated.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonObjectMapper;

impl ObjectMapper for JsonObjectMapper {
    fn to_engine(&self, descriptor: &EntityDescriptor, instance: &Value) -> Result<Value> {
        Ok(rename(instance, descriptor.fields(), Direction::ToEngine))
    }

    fn from_engine(&self, descriptor: &EntityDescriptor, document: &Value) -> Result<Value> {
        Ok(rename(document, descriptor.fields(), Direction::FromEngine))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    ToEngine,
    FromEngine,
}

fn rename(value: &Value, fields: &[FieldDescriptor], direction: Direction) -> Value {
    match value {
        Value::Object(map) => {
            let mut renamed = Map::with_capacity(map.len());
            for (key, inner) in map {
                let field = fields.iter().find(|field| match direction {
                    Direction::ToEngine => field.name == *key,
                    Direction::FromEngine => field.engine_name == *key,
                });
                match field {
                    Some(field) => {
                        let target = match direction {
                            Direction::ToEngine => field.engine_name.clone(),
                            Direction::FromEngine => field.name.clone(),
                        };
                        renamed.insert(target, rename(inner, &field.properties, direction));
                    }
                    None => {
                        renamed.insert(key.clone(), inner.clone());
                    }
                }
            }
            Value::Object(renamed)
        }
        // 🗃️ arrays of objects (nested fields) rename element-wise
        Value::Array(items) => Value::Array(items.iter().map(|item| rename(item, fields, direction)).collect()),
        other => other.clone(),
    }
}
