//! 🪪 The entity descriptor: everything the rest of the crate needs to know about one document type.
//!
//! 🎬 *[a TOML table goes in. an immutable, validated, slightly smug struct comes out.]*
//!
//! 🧠 Knowledge graph:
//! - [`config`] is the raw, untrusted shape people write. [`builder`] validates it and resolves
//!   `${...}` placeholders through an injected resolver. Nothing global, nothing ambient.
//! - [`EntityDescriptor`] is read-only after construction. The [`registry`] builds each one at
//!   most once and hands out `Arc`s for the rest of the process lifetime.
//! - [`access`] reads and writes role fields (identity, version, score...) on JSON documents.
//! - Property lookup for derived queries lives here too: the descriptor is the
//!   [`PropertyPathResolver`] the compiler asks "what does `authorDisplayName` mean?".

use std::collections::BTreeMap;

use crate::criteria::FieldPath;
use crate::query::{PropertyPathResolver, ResolvedProperty};
use crate::rollover::RolloverConditions;
use crate::scheduler::Schedule;

pub mod access;
pub mod builder;
pub mod config;
pub mod registry;

pub use config::{
    DocumentTypeConfig, FieldConfig, FieldRole, FieldType, IndexSettingsConfig, RelationConfig,
    RolloverConfig,
};
pub use registry::DescriptorRegistry;

/// 🔄 The alias pair a rollover-backed type writes and reads through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverAlias {
    pub write_alias: String,
    pub read_alias: Option<String>,
    /// 📛 Physical indices are `{index_prefix}-000001`, `-000002`, ...
    pub index_prefix: String,
}

/// 🧭 Where a document type's documents physically live. Exactly one mode per type.
#[derive(Debug, Clone, PartialEq)]
pub enum AddressingMode {
    /// 📦 One index, forever.
    Fixed { index: String },
    /// 📅 One index per time bucket, named by expanding a strftime `pattern`.
    TimeBased {
        pattern: String,
        /// Engine path of the field whose date picks the bucket. `None` means "now".
        time_field: Option<FieldPath>,
    },
    /// 🔄 A series of indices behind a write alias, rolled when any condition is met.
    RolloverBacked {
        alias: RolloverAlias,
        conditions: RolloverConditions,
    },
}

impl AddressingMode {
    pub fn name(&self) -> &'static str {
        match self {
            AddressingMode::Fixed { .. } => "fixed",
            AddressingMode::TimeBased { .. } => "time-based",
            AddressingMode::RolloverBacked { .. } => "rollover",
        }
    }
}

/// 👪 Parent/child relation, one tagged variant instead of a class hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DocumentRelation {
    #[default]
    None,
    Parent { child_type: String },
    /// Children are routed to their parent's shard by the value at `routing`.
    Child {
        parent_type: String,
        routing: FieldPath,
    },
}

/// ⚙️ Index settings, placeholders resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSettings {
    pub shards: Option<u32>,
    pub replicas: Option<u32>,
    pub refresh_interval: Option<String>,
}

/// 🧩 A validated field, with its full engine path precomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub engine_name: String,
    pub path: FieldPath,
    pub field_type: FieldType,
    pub role: Option<FieldRole>,
    pub properties: Vec<FieldDescriptor>,
}

impl FieldDescriptor {
    /// Answers to its language name or its engine name, case and underscores ignored.
    fn answers_to(&self, normalized: &str) -> bool {
        normalize(&self.name) == normalized || normalize(&self.engine_name) == normalized
    }
}

/// 🪪 One document type, validated and frozen.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub(crate) document_type: String,
    pub(crate) index_name: String,
    pub(crate) alias: Option<String>,
    pub(crate) mode: AddressingMode,
    pub(crate) relation: DocumentRelation,
    pub(crate) settings: IndexSettings,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) roles: BTreeMap<FieldRole, FieldPath>,
    pub(crate) rollover_schedule: Option<Schedule>,
}

impl EntityDescriptor {
    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    /// 📦 The configured (or defaulted) base index name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// 🔍 The declared read alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn mode(&self) -> &AddressingMode {
        &self.mode
    }

    pub fn relation(&self) -> &DocumentRelation {
        &self.relation
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// 🎭 The engine path bound to `role`, if the type declares one.
    pub fn role_field(&self, role: FieldRole) -> Option<&FieldPath> {
        self.roles.get(&role)
    }

    pub fn identity_field(&self) -> Option<&FieldPath> {
        self.role_field(FieldRole::Identity)
    }

    pub fn version_field(&self) -> Option<&FieldPath> {
        self.role_field(FieldRole::Version)
    }

    pub fn score_field(&self) -> Option<&FieldPath> {
        self.role_field(FieldRole::Score)
    }

    pub fn index_name_field(&self) -> Option<&FieldPath> {
        self.role_field(FieldRole::IndexName)
    }

    pub fn completion_field(&self) -> Option<&FieldPath> {
        self.role_field(FieldRole::Completion)
    }

    pub fn parent_id_field(&self) -> Option<&FieldPath> {
        self.role_field(FieldRole::ParentId)
    }

    /// ⏰ Schedule declared on the rollover block. `None` falls back to the scheduler default.
    pub fn rollover_schedule(&self) -> Option<&Schedule> {
        self.rollover_schedule.as_ref()
    }

    pub fn is_rollover_backed(&self) -> bool {
        matches!(self.mode, AddressingMode::RolloverBacked { .. })
    }

    /// 🔎 Find a field by its full engine path.
    pub fn field_at(&self, path: &FieldPath) -> Option<&FieldDescriptor> {
        let mut level = self.fields.as_slice();
        let mut found = None;
        for segment in path.segments() {
            let field = level.iter().find(|field| field.engine_name == segment)?;
            level = field.properties.as_slice();
            found = Some(field);
        }
        found
    }
}

impl PropertyPathResolver for EntityDescriptor {
    /// 🧭 `title`, `authorDisplayName`, `author_displayName` and `author.displayName` all work.
    ///
    /// Names match ignoring case and underscores, against both language and engine names.
    /// Nested properties are found by splitting at `.`, `_` or a camel-case hump, longest
    /// prefix first, and only descending into fields that actually have properties.
    fn resolve(&self, property: &str) -> Option<ResolvedProperty> {
        resolve_in(&self.fields, property).map(|field| ResolvedProperty {
            path: field.path.clone(),
            field_type: field.field_type,
        })
    }
}

fn resolve_in<'a>(fields: &'a [FieldDescriptor], text: &str) -> Option<&'a FieldDescriptor> {
    if text.is_empty() {
        return None;
    }
    let normalized = normalize(text);
    if let Some(field) = fields.iter().find(|field| field.answers_to(&normalized)) {
        return Some(field);
    }

    // ✂️ candidate split points, rightmost first so the longest head wins
    let splits: Vec<(usize, usize)> = text
        .char_indices()
        .skip(1)
        .filter_map(|(at, c)| match c {
            '.' | '_' => Some((at, at + 1)),
            c if c.is_uppercase() => Some((at, at)),
            _ => None,
        })
        .collect();

    for (head_end, tail_start) in splits.into_iter().rev() {
        let head = normalize(&text[..head_end]);
        let Some(parent) = fields
            .iter()
            .find(|field| !field.properties.is_empty() && field.answers_to(&head))
        else {
            continue;
        };
        if let Some(found) = resolve_in(&parent.properties, &text[tail_start..]) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholders::MapEnvironment;

    fn question() -> EntityDescriptor {
        let config = DocumentTypeConfig::new("Question")
            .field(FieldConfig::new("id", FieldType::Keyword).role(FieldRole::Identity))
            .field(FieldConfig::new("title", FieldType::Text))
            .field(FieldConfig::new("view_count", FieldType::Long).engine_name("viewCount"))
            .field(FieldConfig::new("location", FieldType::GeoPoint))
            .field(
                FieldConfig::new("author", FieldType::Object)
                    .property(FieldConfig::new("display_name", FieldType::Keyword).engine_name("displayName"))
                    .property(
                        FieldConfig::new("address", FieldType::Object)
                            .property(FieldConfig::new("city", FieldType::Keyword)),
                    ),
            )
            .field(FieldConfig::new("author_name", FieldType::Text));
        EntityDescriptor::build(&config, &MapEnvironment::default())
            .expect("question should build")
    }

    fn path_of(descriptor: &EntityDescriptor, property: &str) -> Option<String> {
        descriptor.resolve(property).map(|p| p.path.as_str().to_string())
    }

    #[test]
    fn the_one_where_every_spelling_of_a_property_lands_on_the_engine_name() {
        let q = question();
        assert_eq!(path_of(&q, "title").as_deref(), Some("title"));
        assert_eq!(path_of(&q, "Title").as_deref(), Some("title"));
        assert_eq!(path_of(&q, "viewCount").as_deref(), Some("viewCount"));
        assert_eq!(path_of(&q, "view_count").as_deref(), Some("viewCount"));
        assert_eq!(path_of(&q, "AuthorDisplayName").as_deref(), Some("author.displayName"));
        assert_eq!(path_of(&q, "author_displayName").as_deref(), Some("author.displayName"));
        assert_eq!(path_of(&q, "author.displayName").as_deref(), Some("author.displayName"));
        assert_eq!(path_of(&q, "authorAddressCity").as_deref(), Some("author.address.city"));
        assert_eq!(path_of(&q, "nope"), None);
        assert_eq!(path_of(&q, "authorNope"), None);
    }

    #[test]
    fn the_one_where_a_flat_field_beats_a_nested_guess() {
        // 🥊 `authorName` is a real top-level field, so it wins over author -> name
        let q = question();
        assert_eq!(path_of(&q, "authorName").as_deref(), Some("author_name"));
    }

    #[test]
    fn the_one_where_types_travel_with_the_path() {
        let q = question();
        let resolved = q.resolve("location").expect("location is declared");
        assert!(resolved.field_type.is_geo());
        assert_eq!(
            q.field_at(&FieldPath::new("author.address.city")).map(|f| f.field_type),
            Some(FieldType::Keyword)
        );
        assert_eq!(q.identity_field().map(FieldPath::as_str), Some("id"));
        assert_eq!(q.version_field(), None);
    }
}
