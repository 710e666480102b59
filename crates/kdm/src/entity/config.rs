//! 📋 Raw document-type configuration: what people write in `kdm.toml`, before anyone validates it.
//!
//! 🧠 Knowledge graph:
//! - Deserialized by figment as part of `AppConfig::document_types`, or built in code with the
//!   chainable helpers below (tests do that a lot).
//! - Nothing here is trusted. Placeholders are unresolved, roles may collide, patterns may be
//!   empty. `EntityDescriptor::build` is the bouncer that turns this into something immutable.
//! - Field names are "language" names (what the struct field is called). `engine_name` is what
//!   the search engine calls it, defaulting to the language name.

use serde::Deserialize;

/// 📦 One document type, as configured.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct DocumentTypeConfig {
    /// 🏷️ The document type's identity. Also the default index name, lowercased.
    pub name: String,
    /// 📦 Physical index name for fixed addressing, base name otherwise.
    #[serde(default)]
    pub index_name: Option<String>,
    /// 🔍 Read alias. When present, every query goes through it.
    #[serde(default)]
    pub alias: Option<String>,
    /// 📅 strftime pattern for time-bucketed indices, e.g. `orders-%Y.%m.%d`.
    #[serde(default)]
    pub time_pattern: Option<String>,
    /// 📅 Field whose date picks the bucket. Absent means "today, UTC".
    #[serde(default)]
    pub time_field: Option<String>,
    /// 🔄 Presence of this block wins over everything else: the type is rollover backed.
    #[serde(default)]
    pub rollover: Option<RolloverConfig>,
    #[serde(default)]
    pub settings: IndexSettingsConfig,
    #[serde(default)]
    pub relation: Option<RelationConfig>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

/// 🔄 Rollover block. Strings, so placeholders can live in them.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RolloverConfig {
    pub write_alias: String,
    #[serde(default)]
    pub read_alias: Option<String>,
    /// 📛 Physical indices are named `{index_prefix}-000001`, `-000002`, ... Defaults to the write alias.
    #[serde(default)]
    pub index_prefix: Option<String>,
    #[serde(default)]
    pub max_age: Option<String>,
    /// 🔢 0 means unset, same as leaving it out.
    #[serde(default)]
    pub max_docs: Option<u64>,
    #[serde(default)]
    pub max_size: Option<String>,
    /// ⏰ How often the rollover trigger checks. Defaults to the scheduler-wide default.
    #[serde(default)]
    pub schedule: Option<String>,
}

/// ⚙️ Index settings sent along when an index is created.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct IndexSettingsConfig {
    #[serde(default)]
    pub shards: Option<u32>,
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub refresh_interval: Option<String>,
}

/// 👪 Parent/child, as a sum type instead of a class hierarchy.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RelationConfig {
    ParentOf {
        child: String,
    },
    ChildOf {
        parent: String,
        /// 🧭 Field carrying the routing value. Defaults to the parent-id role field.
        #[serde(default)]
        routing_field: Option<String>,
    },
}

/// 🧬 The engine-side type of a field.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Keyword,
    Long,
    Integer,
    Double,
    Float,
    Boolean,
    Date,
    GeoPoint,
    Completion,
    Object,
    Nested,
}

impl FieldType {
    /// 🗺️ The mapping type name the engine expects.
    pub fn engine_type(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Long => "long",
            FieldType::Integer => "integer",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::GeoPoint => "geo_point",
            FieldType::Completion => "completion",
            FieldType::Object => "object",
            FieldType::Nested => "nested",
        }
    }

    pub fn is_geo(self) -> bool {
        matches!(self, FieldType::GeoPoint)
    }
}

/// 🎭 Special jobs a field can hold. At most one field per role per document type.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Identity,
    Version,
    Score,
    IndexName,
    Completion,
    ParentId,
}

impl FieldRole {
    pub const ALL: [FieldRole; 6] = [
        FieldRole::Identity,
        FieldRole::Version,
        FieldRole::Score,
        FieldRole::IndexName,
        FieldRole::Completion,
        FieldRole::ParentId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldRole::Identity => "identity",
            FieldRole::Version => "version",
            FieldRole::Score => "score",
            FieldRole::IndexName => "index-name",
            FieldRole::Completion => "completion",
            FieldRole::ParentId => "parent-id",
        }
    }
}

/// 🧩 One declared field. Objects and nested fields carry their own `properties`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub engine_name: Option<String>,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub role: Option<FieldRole>,
    #[serde(default)]
    pub properties: Vec<FieldConfig>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            engine_name: None,
            field_type,
            role: None,
            properties: Vec::new(),
        }
    }

    pub fn engine_name(mut self, engine_name: impl Into<String>) -> Self {
        self.engine_name = Some(engine_name.into());
        self
    }

    pub fn role(mut self, role: FieldRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn property(mut self, property: FieldConfig) -> Self {
        self.properties.push(property);
        self
    }
}

impl DocumentTypeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn time_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.time_pattern = Some(pattern.into());
        self
    }

    pub fn time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = Some(field.into());
        self
    }

    pub fn rollover(mut self, rollover: RolloverConfig) -> Self {
        self.rollover = Some(rollover);
        self
    }

    pub fn relation(mut self, relation: RelationConfig) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }
}

impl RolloverConfig {
    pub fn new(write_alias: impl Into<String>) -> Self {
        Self {
            write_alias: write_alias.into(),
            ..Self::default()
        }
    }

    pub fn max_age(mut self, max_age: impl Into<String>) -> Self {
        self.max_age = Some(max_age.into());
        self
    }

    pub fn max_docs(mut self, max_docs: u64) -> Self {
        self.max_docs = Some(max_docs);
        self
    }

    pub fn max_size(mut self, max_size: impl Into<String>) -> Self {
        self.max_size = Some(max_size.into());
        self
    }

    pub fn read_alias(mut self, read_alias: impl Into<String>) -> Self {
        self.read_alias = Some(read_alias.into());
        self
    }

    pub fn schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }
}
