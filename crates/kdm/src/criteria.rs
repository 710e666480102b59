//! 🧱 Criteria: the predicate chain every query boils down to.
//!
//! 🎬 *[a method name walks into a compiler. a flat list of predicates walks out.]*
//!
//! A [`Criteria`] is an ordered chain of [`CriteriaNode`]s. Each node says which field,
//! which [`Operator`], which value, whether it is negated, how much it is boosted, and how it
//! attaches to the node before it ([`Conjunction`]).
//!
//! ## The OR rule (read this twice) 🧠
//!
//! The chain is flat. An `Or` node does not open a nested group; it starts a new AND-run that
//! is OR-ed with everything before it:
//!
//! ```text
//!   A and B or C and D   ==   (A AND B) OR (C AND D)
//!   A or B and C         ==   A OR (B AND C)
//! ```
//!
//! Node order is kept exactly as built. Nothing reorders, nothing "optimizes". [`Criteria::groups`]
//! slices the chain at every `Or` node, and both the renderer and the in-memory evaluator
//! work off those slices.
//!
//! 🦆 The duck approves of flat data structures. The duck has been burned by trees before.

use std::fmt;

use serde_json::Value;

pub mod geo;
pub mod eval;
pub mod render;

pub use geo::{Distance, DistanceUnit, GeoBox, GeoPoint};

// ============================================================
// 🛤️ FieldPath
// ============================================================

/// 🛤️ A dotted field path in engine-field-name space, e.g. `author.displayName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// ➕ `author` + `displayName` = `author.displayName`
    pub fn child(&self, segment: &str) -> FieldPath {
        if self.0.is_empty() {
            FieldPath::new(segment)
        } else {
            FieldPath(format!("{}.{}", self.0, segment))
        }
    }

    /// 🔎 Walk a JSON document down this path.
    pub fn lookup<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.segments()
            .try_fold(document, |current, segment| current.as_object()?.get(segment))
    }

    /// ✍️ Write `value` at this path, creating intermediate objects along the way.
    ///
    /// Returns `false` when something on the way is not an object (a string, a number...)
    /// and the write would have to clobber it. We do not clobber.
    pub fn assign(&self, document: &mut Value, value: Value) -> bool {
        let segments: Vec<&str> = self.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };
        let mut current = document;
        for segment in parents {
            let Some(object) = current.as_object_mut() else {
                return false;
            };
            current = object
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
        match current.as_object_mut() {
            Some(object) => {
                object.insert(last.to_string(), value);
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath::new(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        FieldPath(path)
    }
}

// ============================================================
// ⚙️ Operators, values, conjunctions
// ============================================================

/// ⚙️ What a node asks of its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Fuzzy,
    Expression,
    Between,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    NotIn,
    Within,
    BoundedBy,
}

impl Operator {
    /// 🗺️ Geo operators filter, they do not score.
    pub fn is_filter(self) -> bool {
        matches!(self, Operator::Within | Operator::BoundedBy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS_WITH",
            Operator::EndsWith => "ENDS_WITH",
            Operator::Fuzzy => "FUZZY",
            Operator::Expression => "EXPRESSION",
            Operator::Between => "BETWEEN",
            Operator::Less => "LESS",
            Operator::LessEqual => "LESS_EQUAL",
            Operator::Greater => "GREATER",
            Operator::GreaterEqual => "GREATER_EQUAL",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Within => "WITHIN",
            Operator::BoundedBy => "BOUNDED_BY",
        }
    }
}

/// 📦 The operand(s). Shape depends on the operator's arity.
#[derive(Debug, Clone, PartialEq)]
pub enum CriteriaValue {
    Single(Value),
    /// 🔢 Between. `None` on either side means open-ended.
    Range {
        from: Option<Value>,
        to: Option<Value>,
    },
    Many(Vec<Value>),
    Circle {
        center: GeoPoint,
        radius: Distance,
    },
    Box(GeoBox),
}

/// 🔗 How a node attaches to the node before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conjunction {
    And,
    Or,
}

/// 🧩 One predicate in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaNode {
    field: FieldPath,
    operator: Operator,
    value: CriteriaValue,
    negated: bool,
    /// NaN = unset
    boost: f32,
    conjunction: Conjunction,
}

impl CriteriaNode {
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &CriteriaValue {
        &self.value
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn boost(&self) -> Option<f32> {
        (!self.boost.is_nan()).then_some(self.boost)
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }
}

// ============================================================
// 🧱 Criteria + builder
// ============================================================

/// 🧱 An ordered, flat chain of predicate nodes. Read-only once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria {
    nodes: Vec<CriteriaNode>,
}

impl Criteria {
    /// An empty chain. Matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// 🚀 Start a chain on `field`.
    pub fn where_field(field: impl Into<FieldPath>) -> CriteriaBuilder {
        Criteria::new().and(field)
    }

    /// 🔗 Extend the current AND-run with another predicate.
    pub fn and(self, field: impl Into<FieldPath>) -> CriteriaBuilder {
        CriteriaBuilder::new(self, field.into(), Conjunction::And)
    }

    /// 🔀 Start a new AND-run, OR-ed with everything so far.
    pub fn or(self, field: impl Into<FieldPath>) -> CriteriaBuilder {
        CriteriaBuilder::new(self, field.into(), Conjunction::Or)
    }

    /// 🔗 Append another chain; its first node joins with AND, the rest keep their tags.
    pub fn and_criteria(self, other: Criteria) -> Criteria {
        self.append(other, Conjunction::And)
    }

    /// 🔀 Union another chain into this one: its first node joins with OR.
    ///
    /// Flat union, not a nested group. `(A and B).or_criteria(C and D)` is `(A AND B) OR (C AND D)`.
    pub fn or_criteria(self, other: Criteria) -> Criteria {
        self.append(other, Conjunction::Or)
    }

    fn append(mut self, other: Criteria, joint: Conjunction) -> Criteria {
        let mut incoming = other.nodes.into_iter();
        if let Some(mut first) = incoming.next() {
            first.conjunction = joint;
            self.nodes.push(first);
            self.nodes.extend(incoming);
        }
        self
    }

    pub fn nodes(&self) -> &[CriteriaNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// ✂️ Slice the chain into AND-runs. The chain means: any run whose nodes all hold.
    pub fn groups(&self) -> Vec<&[CriteriaNode]> {
        let mut groups = Vec::new();
        let mut start = 0;
        for (position, node) in self.nodes.iter().enumerate() {
            if position > start && node.conjunction == Conjunction::Or {
                groups.push(&self.nodes[start..position]);
                start = position;
            }
        }
        if start < self.nodes.len() {
            groups.push(&self.nodes[start..]);
        }
        groups
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            return f.write_str("<everything>");
        }
        for (position, node) in self.nodes.iter().enumerate() {
            if position > 0 {
                let joint = match node.conjunction {
                    Conjunction::And => " AND ",
                    Conjunction::Or => " OR ",
                };
                f.write_str(joint)?;
            }
            if node.negated {
                f.write_str("NOT ")?;
            }
            write!(f, "{} {} ", node.field, node.operator.as_str())?;
            match &node.value {
                CriteriaValue::Single(value) => write!(f, "{value}")?,
                CriteriaValue::Range { from, to } => write!(
                    f,
                    "[{}, {}]",
                    from.as_ref().map_or("*".to_string(), Value::to_string),
                    to.as_ref().map_or("*".to_string(), Value::to_string)
                )?,
                CriteriaValue::Many(values) => write!(f, "{}", Value::Array(values.clone()))?,
                CriteriaValue::Circle { center, radius } => {
                    write!(f, "{radius} of ({}, {})", center.lat, center.lon)?
                }
                CriteriaValue::Box(bbox) => write!(
                    f,
                    "({}, {})..({}, {})",
                    bbox.top_left.lat, bbox.top_left.lon, bbox.bottom_right.lat, bbox.bottom_right.lon
                )?,
            }
            if let Some(boost) = node.boost() {
                write!(f, "^{boost}")?;
            }
        }
        Ok(())
    }
}

/// 🏗️ Half-built node: field and conjunction known, operator pending.
#[derive(Debug, Clone)]
#[must_use = "a criteria builder does nothing until an operator method finishes it"]
pub struct CriteriaBuilder {
    base: Criteria,
    field: FieldPath,
    conjunction: Conjunction,
    negated: bool,
    boost: f32,
}

impl CriteriaBuilder {
    fn new(base: Criteria, field: FieldPath, conjunction: Conjunction) -> Self {
        Self {
            base,
            field,
            conjunction,
            negated: false,
            boost: f32::NAN,
        }
    }

    /// 🙅 Flip the node.
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn is(self, value: impl Into<Value>) -> Criteria {
        self.finish(Operator::Equals, CriteriaValue::Single(value.into()))
    }

    pub fn contains(self, text: impl Into<String>) -> Criteria {
        self.finish(Operator::Contains, CriteriaValue::Single(Value::String(text.into())))
    }

    pub fn starts_with(self, text: impl Into<String>) -> Criteria {
        self.finish(Operator::StartsWith, CriteriaValue::Single(Value::String(text.into())))
    }

    pub fn ends_with(self, text: impl Into<String>) -> Criteria {
        self.finish(Operator::EndsWith, CriteriaValue::Single(Value::String(text.into())))
    }

    pub fn fuzzy(self, text: impl Into<String>) -> Criteria {
        self.finish(Operator::Fuzzy, CriteriaValue::Single(Value::String(text.into())))
    }

    pub fn expression(self, expression: impl Into<String>) -> Criteria {
        self.finish(Operator::Expression, CriteriaValue::Single(Value::String(expression.into())))
    }

    pub fn between(self, from: impl Into<Value>, to: impl Into<Value>) -> Criteria {
        self.between_bounds(Some(from.into()), Some(to.into()))
    }

    /// 🔓 Between with optional ends. Both `None` is legal and matches any value of the field.
    pub fn between_bounds(self, from: Option<Value>, to: Option<Value>) -> Criteria {
        self.finish(Operator::Between, CriteriaValue::Range { from, to })
    }

    pub fn less_than(self, value: impl Into<Value>) -> Criteria {
        self.finish(Operator::Less, CriteriaValue::Single(value.into()))
    }

    pub fn less_than_equal(self, value: impl Into<Value>) -> Criteria {
        self.finish(Operator::LessEqual, CriteriaValue::Single(value.into()))
    }

    pub fn greater_than(self, value: impl Into<Value>) -> Criteria {
        self.finish(Operator::Greater, CriteriaValue::Single(value.into()))
    }

    pub fn greater_than_equal(self, value: impl Into<Value>) -> Criteria {
        self.finish(Operator::GreaterEqual, CriteriaValue::Single(value.into()))
    }

    pub fn in_values<I, V>(self, values: I) -> Criteria
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.finish(Operator::In, CriteriaValue::Many(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<I, V>(self, values: I) -> Criteria
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.finish(Operator::NotIn, CriteriaValue::Many(values.into_iter().map(Into::into).collect()))
    }

    pub fn within(self, center: GeoPoint, radius: Distance) -> Criteria {
        self.finish(Operator::Within, CriteriaValue::Circle { center, radius })
    }

    pub fn bounded_by(self, bbox: GeoBox) -> Criteria {
        self.finish(Operator::BoundedBy, CriteriaValue::Box(bbox))
    }

    fn finish(self, operator: Operator, value: CriteriaValue) -> Criteria {
        let mut criteria = self.base;
        criteria.nodes.push(CriteriaNode {
            field: self.field,
            operator,
            value,
            negated: self.negated,
            boost: self.boost,
            conjunction: self.conjunction,
        });
        criteria
    }
}

// ============================================================
// ↕️ Sorting
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// ↕️ One sort directive. Kept beside the chain, never inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: FieldPath,
    pub direction: Direction,
}

impl SortOrder {
    pub fn new(field: impl Into<FieldPath>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_and_then_or_keeps_its_tags_in_order() {
        let criteria = Criteria::where_field("a")
            .is("x")
            .and("b")
            .is("y")
            .or("c")
            .is("z");

        let tags: Vec<Conjunction> = criteria.nodes().iter().map(CriteriaNode::conjunction).collect();
        assert_eq!(tags, vec![Conjunction::And, Conjunction::And, Conjunction::Or]);

        let groups = criteria.groups();
        assert_eq!(groups.len(), 2, "(a AND b) OR c is two runs");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1][0].field().as_str(), "c");
    }

    #[test]
    fn the_one_where_or_first_then_and_binds_to_the_right() {
        let criteria = Criteria::where_field("a").is(1).or("b").is(2).and("c").is(3);
        let groups = criteria.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 1, "a stands alone");
        assert_eq!(groups[1].len(), 2, "b AND c travel together");
    }

    #[test]
    fn the_one_where_or_criteria_is_a_flat_union() {
        let left = Criteria::where_field("a").is(1).and("b").is(2);
        let right = Criteria::where_field("c").is(3).and("d").is(4);
        let union = left.or_criteria(right);
        assert_eq!(union.len(), 4);
        assert_eq!(union.nodes()[2].conjunction(), Conjunction::Or);
        assert_eq!(union.nodes()[3].conjunction(), Conjunction::And);
        assert_eq!(union.to_string(), r#"a EQUALS 1 AND b EQUALS 2 OR c EQUALS 3 AND d EQUALS 4"#);
    }

    #[test]
    fn the_one_where_boost_defaults_to_nothing_and_not_flips() {
        let criteria = Criteria::where_field("title").not().boost(2.0).contains("rust")
            .and("body").contains("borrow");
        assert!(criteria.nodes()[0].is_negated());
        assert_eq!(criteria.nodes()[0].boost(), Some(2.0));
        assert_eq!(criteria.nodes()[1].boost(), None);
        assert!(!criteria.nodes()[1].is_negated());
    }

    #[test]
    fn the_one_where_field_paths_walk_and_write_nested_documents() {
        let mut document = json!({"author": {"name": "ferris"}, "title": "crabs"});
        let path = FieldPath::new("author.name");
        assert_eq!(path.lookup(&document), Some(&json!("ferris")));
        assert_eq!(FieldPath::new("author.missing").lookup(&document), None);

        assert!(FieldPath::new("meta.score").assign(&mut document, json!(1.5)));
        assert_eq!(document["meta"]["score"], json!(1.5));
        assert!(
            !FieldPath::new("title.inner").assign(&mut document, json!(1)),
            "a string is not a folder"
        );
        assert_eq!(FieldPath::new("").child("id").as_str(), "id");
        assert_eq!(FieldPath::new("author").child("id").as_str(), "author.id");
    }

    #[test]
    fn the_one_where_an_empty_chain_has_no_groups() {
        assert!(Criteria::new().groups().is_empty());
        assert_eq!(Criteria::new().to_string(), "<everything>");
    }
}
