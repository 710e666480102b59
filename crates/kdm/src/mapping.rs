//! 🏗️ Create-index bodies: settings, mappings from field types, the parent/child join field,
//! and the aliases the new index is born with.
//!
//! ```text
//!   EntityDescriptor ──► { "settings": {...}, "mappings": { "properties": {...} }, "aliases": {...} }
//! ```

use serde_json::{Map, Value, json};

use crate::entity::{DocumentRelation, EntityDescriptor, FieldDescriptor};

/// 👪 The join field parents and children share. Only mapped on types with a relation.
pub const JOIN_FIELD: &str = "kdm_relation";

/// 🏷️ An alias a new index should carry from birth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAlias {
    pub name: String,
    pub is_write_index: bool,
}

impl IndexAlias {
    pub fn read(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_write_index: false,
        }
    }

    pub fn write(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_write_index: true,
        }
    }
}

/// 📦 The full body for `PUT /{index}`.
pub fn index_body(descriptor: &EntityDescriptor, aliases: &[IndexAlias]) -> Value {
    let mut body = Map::new();

    let settings = descriptor.settings();
    let mut index_settings = Map::new();
    if let Some(shards) = settings.shards {
        index_settings.insert("number_of_shards".into(), json!(shards));
    }
    if let Some(replicas) = settings.replicas {
        index_settings.insert("number_of_replicas".into(), json!(replicas));
    }
    if let Some(refresh_interval) = &settings.refresh_interval {
        index_settings.insert("refresh_interval".into(), json!(refresh_interval));
    }
    if !index_settings.is_empty() {
        body.insert("settings".into(), json!({ "index": index_settings }));
    }

    let mut properties = properties_of(descriptor.fields());
    if let Some(join) = join_mapping(descriptor) {
        properties.insert(JOIN_FIELD.into(), join);
    }
    body.insert("mappings".into(), json!({ "properties": properties }));

    if !aliases.is_empty() {
        let declared: Map<String, Value> = aliases
            .iter()
            .map(|alias| {
                let options = if alias.is_write_index {
                    json!({ "is_write_index": true })
                } else {
                    json!({})
                };
                (alias.name.clone(), options)
            })
            .collect();
        body.insert("aliases".into(), Value::Object(declared));
    }

    Value::Object(body)
}

fn properties_of(fields: &[FieldDescriptor]) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| {
            let mut mapping = Map::new();
            mapping.insert("type".into(), json!(field.field_type.engine_type()));
            if !field.properties.is_empty() {
                mapping.insert("properties".into(), Value::Object(properties_of(&field.properties)));
            }
            (field.engine_name.clone(), Value::Object(mapping))
        })
        .collect()
}

fn join_mapping(descriptor: &EntityDescriptor) -> Option<Value> {
    let (parent, child) = match descriptor.relation() {
        DocumentRelation::None => return None,
        DocumentRelation::Parent { child_type } => (descriptor.document_type(), child_type.as_str()),
        DocumentRelation::Child { parent_type, .. } => (parent_type.as_str(), descriptor.document_type()),
    };
    Some(json!({
        "type": "join",
        "relations": { parent.to_lowercase(): child.to_lowercase() }
    }))
}

/// 👪 The join-field value a document of this type carries. Children name their parent.
pub fn join_value(descriptor: &EntityDescriptor, parent_id: Option<&str>) -> Option<Value> {
    match descriptor.relation() {
        DocumentRelation::None => None,
        DocumentRelation::Parent { .. } => Some(json!(descriptor.document_type().to_lowercase())),
        DocumentRelation::Child { .. } => Some(json!({
            "name": descriptor.document_type().to_lowercase(),
            "parent": parent_id,
        })),
    }
}
