//! 🔍 Derived queries: a method name plus positional arguments becomes a [`Criteria`] chain.
//!
//! ```text
//!   "findTop5ByTitleContainingOrVotesGreaterThanOrderByVotesDesc", ["rust", 10]
//!        │  part_tree::PartTree::parse
//!        ▼
//!   subject=find limit=5  [[title CONTAINING]] OR [[votes GREATER_THAN]]  sort=[votes desc]
//!        │  compiler::compile (+ a PropertyPathResolver, + the arguments)
//!        ▼
//!   CompiledQuery { criteria: title CONTAINING "rust" OR votes GREATER 10, sort, limit }
//! ```
//!
//! Parsing needs nothing but the name. Compilation needs to know the document type's fields
//! (to turn `authorDisplayName` into `author.displayName` and to spot geo fields), which it
//! gets through [`PropertyPathResolver`]. No network, no serialization, no surprises.

use serde_json::Value;

use crate::criteria::{Criteria, Distance, FieldPath, GeoBox, GeoPoint, SortOrder};
use crate::entity::FieldType;

pub mod compiler;
pub mod keywords;
pub mod part_tree;

pub use compiler::{EXACT_POINT_RADIUS, compile, compile_method};
pub use keywords::PredicateKeyword;
pub use part_tree::{OrderPart, Part, PartTree, SubjectKind};

/// 🧭 A property as the engine knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProperty {
    pub path: FieldPath,
    pub field_type: FieldType,
}

/// 🗺️ Turns property text from a method name into an engine field path.
pub trait PropertyPathResolver {
    fn resolve(&self, property: &str) -> Option<ResolvedProperty>;
}

/// 📦 One bound argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Value(Value),
    Point(GeoPoint),
    Distance(Distance),
    Box(GeoBox),
    List(Vec<Value>),
}

impl Parameter {
    /// 🔎 Classify a JSON argument. Point-shaped and box-shaped objects become geo
    /// parameters, everything else stays a plain value.
    pub fn from_json(value: Value) -> Parameter {
        let Value::Object(map) = &value else {
            return Parameter::Value(value);
        };
        let point = |key: &str| map.get(key).and_then(GeoPoint::from_value);
        if map.len() == 2 {
            if let (Some(top_left), Some(bottom_right)) = (point("top_left"), point("bottom_right")) {
                return Parameter::Box(GeoBox::new(top_left, bottom_right));
            }
            if let Some(point) = GeoPoint::from_value(&value) {
                return Parameter::Point(point);
            }
        }
        Parameter::Value(value)
    }

    /// What kind of thing this is, for error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Parameter::Value(Value::Null) => "null",
            Parameter::Value(Value::String(_)) => "a string",
            Parameter::Value(Value::Array(_)) | Parameter::List(_) => "a list",
            Parameter::Value(_) => "a value",
            Parameter::Point(_) => "a point",
            Parameter::Distance(_) => "a distance",
            Parameter::Box(_) => "a box",
        }
    }
}

impl From<Value> for Parameter {
    fn from(value: Value) -> Self {
        Parameter::Value(value)
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Parameter::Value(Value::String(value.to_string()))
    }
}

impl From<i64> for Parameter {
    fn from(value: i64) -> Self {
        Parameter::Value(Value::from(value))
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Parameter::Value(Value::from(value))
    }
}

impl From<bool> for Parameter {
    fn from(value: bool) -> Self {
        Parameter::Value(Value::Bool(value))
    }
}

impl From<GeoPoint> for Parameter {
    fn from(point: GeoPoint) -> Self {
        Parameter::Point(point)
    }
}

impl From<Distance> for Parameter {
    fn from(distance: Distance) -> Self {
        Parameter::Distance(distance)
    }
}

impl From<GeoBox> for Parameter {
    fn from(bbox: GeoBox) -> Self {
        Parameter::Box(bbox)
    }
}

impl From<Vec<Value>> for Parameter {
    fn from(values: Vec<Value>) -> Self {
        Parameter::List(values)
    }
}

/// ✅ A compiled derived query: what to do, which documents, in which order, how many.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub subject: SubjectKind,
    pub criteria: Criteria,
    pub sort: Vec<SortOrder>,
    pub limit: Option<usize>,
}
