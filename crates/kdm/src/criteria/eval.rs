//! 🧮 In-process evaluation of a criteria chain against a JSON document.
//!
//! Same semantics the rendered engine query has: any AND-run whose nodes all hold.
//! The in-memory engine uses this to answer searches, tests use it to prove the OR rule.
//!
//! Rough edges vs. a real engine, on purpose: no analyzers (strings compare case-insensitively),
//! `EXPRESSION` is a regex, `FUZZY` uses the engine's AUTO edit distance.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::Value;

use super::{Criteria, CriteriaNode, CriteriaValue, GeoPoint, Operator};

impl Criteria {
    /// ✅ Does `document` satisfy the chain? An empty chain matches everything.
    pub fn matches(&self, document: &Value) -> bool {
        if self.is_empty() {
            return true;
        }
        self.groups()
            .into_iter()
            .any(|group| group.iter().all(|node| node_matches(node, document)))
    }
}

fn node_matches(node: &CriteriaNode, document: &Value) -> bool {
    let raw = match node.field().lookup(document) {
        None | Some(Value::Null) => false,
        // 🙅 NOT_IN is "none of the values are in the set", not "some value is outside it"
        Some(actual) if node.operator() == Operator::NotIn => {
            !any_value(actual, |candidate| in_set(candidate, node.value()))
        }
        Some(actual) if node.operator().is_filter() => geo_matches(actual, node.value()),
        Some(actual) => any_value(actual, |candidate| scalar_matches(node.operator(), node.value(), candidate)),
    };
    raw != node.is_negated()
}

/// 🗃️ Multi-valued fields match when any of their values does.
fn any_value(actual: &Value, check: impl Fn(&Value) -> bool) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(check),
        single => check(single),
    }
}

fn scalar_matches(operator: Operator, expected: &CriteriaValue, actual: &Value) -> bool {
    match (operator, expected) {
        (Operator::Equals, CriteriaValue::Single(value)) => loosely_equal(actual, value),
        (Operator::Contains, CriteriaValue::Single(value)) => text_check(actual, value, |a, e| a.contains(e)),
        (Operator::StartsWith, CriteriaValue::Single(value)) => text_check(actual, value, |a, e| a.starts_with(e)),
        (Operator::EndsWith, CriteriaValue::Single(value)) => text_check(actual, value, |a, e| a.ends_with(e)),
        (Operator::Fuzzy, CriteriaValue::Single(value)) => {
            text_check(actual, value, |a, e| edit_distance(a, e) <= auto_fuzziness(e))
        }
        (Operator::Expression, CriteriaValue::Single(Value::String(pattern))) => {
            let Some(text) = actual.as_str() else {
                return false;
            };
            RegexBuilder::new(&format!("^(?:{pattern})$"))
                .case_insensitive(true)
                .build()
                .map(|regex| regex.is_match(text))
                .unwrap_or(false)
        }
        (Operator::Between, CriteriaValue::Range { from, to }) => {
            let above = from
                .as_ref()
                .is_none_or(|from| matches!(compare(actual, from), Some(Ordering::Greater | Ordering::Equal)));
            let below = to
                .as_ref()
                .is_none_or(|to| matches!(compare(actual, to), Some(Ordering::Less | Ordering::Equal)));
            above && below
        }
        (Operator::Less, CriteriaValue::Single(value)) => compare(actual, value) == Some(Ordering::Less),
        (Operator::LessEqual, CriteriaValue::Single(value)) => {
            matches!(compare(actual, value), Some(Ordering::Less | Ordering::Equal))
        }
        (Operator::Greater, CriteriaValue::Single(value)) => compare(actual, value) == Some(Ordering::Greater),
        (Operator::GreaterEqual, CriteriaValue::Single(value)) => {
            matches!(compare(actual, value), Some(Ordering::Greater | Ordering::Equal))
        }
        (Operator::In, values) => in_set(actual, values),
        // 🤷 operator/value shapes that the builder never produces
        _ => false,
    }
}

fn geo_matches(actual: &Value, expected: &CriteriaValue) -> bool {
    let check = |point: GeoPoint| match expected {
        CriteriaValue::Circle { center, radius } => point.distance_km(center) <= radius.as_km(),
        CriteriaValue::Box(bbox) => bbox.contains(&point),
        _ => false,
    };
    if let Some(point) = GeoPoint::from_value(actual) {
        return check(point);
    }
    match actual {
        Value::Array(items) => items.iter().filter_map(GeoPoint::from_value).any(check),
        _ => false,
    }
}

fn in_set(actual: &Value, expected: &CriteriaValue) -> bool {
    match expected {
        CriteriaValue::Many(values) => values.iter().any(|value| loosely_equal(actual, value)),
        _ => false,
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => a.to_lowercase() == e.to_lowercase(),
        (Value::Number(_), Value::Number(_)) => compare(actual, expected) == Some(Ordering::Equal),
        // 🔢 "42" == 42, the engine coerces and so do we
        (Value::String(a), Value::Number(n)) | (Value::Number(n), Value::String(a)) => {
            a.parse::<f64>().ok() == n.as_f64()
        }
        _ => actual == expected,
    }
}

fn text_check(actual: &Value, expected: &Value, check: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => check(&a.to_lowercase(), &e.to_lowercase()),
        _ => false,
    }
}

/// ⚖️ Numbers compare as numbers, strings compare lexically (ISO dates sort correctly that way).
pub(crate) fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => a.as_f64()?.partial_cmp(&e.as_f64()?),
        (Value::String(a), Value::String(e)) => Some(a.as_str().cmp(e.as_str())),
        (Value::String(a), Value::Number(e)) => a.parse::<f64>().ok()?.partial_cmp(&e.as_f64()?),
        (Value::Bool(a), Value::Bool(e)) => Some(a.cmp(e)),
        _ => None,
    }
}

// 🔤 engine AUTO fuzziness: exact up to 2 chars, 1 edit up to 5, 2 edits beyond
fn auto_fuzziness(term: &str) -> usize {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}
