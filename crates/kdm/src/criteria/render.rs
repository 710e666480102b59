//! 🖨️ Render a criteria chain into engine query DSL.
//!
//! ```text
//!   (A AND NOT B) OR C
//!        │
//!        ▼
//!   {"bool": {"should": [
//!       {"bool": {"must": [A], "must_not": [B]}},
//!       {"bool": {"must": [C]}}
//!   ], "minimum_should_match": 1}}
//! ```
//!
//! One AND-run renders as a single `bool`. Geo operators land in `filter` because they do
//! not score. An empty chain is `match_all`.

use serde_json::{Map, Value, json};

use super::{Criteria, CriteriaNode, CriteriaValue, Operator, SortOrder};

/// 🔍 The `query` part of a search body.
pub fn render_query(criteria: &Criteria) -> Value {
    let groups = criteria.groups();
    match groups.as_slice() {
        [] => json!({ "match_all": {} }),
        [only] => render_group(only),
        many => json!({
            "bool": {
                "should": many.iter().map(|group| render_group(group)).collect::<Vec<_>>(),
                "minimum_should_match": 1
            }
        }),
    }
}

/// 📦 A complete `_search` body: query, sort, size.
pub fn render_search_body(criteria: &Criteria, sort: &[SortOrder], limit: Option<usize>) -> Value {
    let mut body = Map::new();
    body.insert("query".into(), render_query(criteria));
    if !sort.is_empty() {
        let sort: Vec<Value> = sort
            .iter()
            .map(|order| json!({ order.field.as_str(): { "order": order.direction.as_str() } }))
            .collect();
        body.insert("sort".into(), Value::Array(sort));
    }
    if let Some(limit) = limit {
        body.insert("size".into(), json!(limit));
    }
    Value::Object(body)
}

fn render_group(group: &[CriteriaNode]) -> Value {
    let mut must = Vec::new();
    let mut must_not = Vec::new();
    let mut filter = Vec::new();

    for node in group {
        // 🙃 NOT_IN renders as the negation of a terms query, so it flips the bucket
        let negated = node.is_negated() != (node.operator() == Operator::NotIn);
        let clause = render_node(node);
        match (negated, node.operator().is_filter()) {
            (true, _) => must_not.push(clause),
            (false, true) => filter.push(clause),
            (false, false) => must.push(clause),
        }
    }

    let mut bool_query = Map::new();
    for (occur, clauses) in [("must", must), ("must_not", must_not), ("filter", filter)] {
        if !clauses.is_empty() {
            bool_query.insert(occur.into(), Value::Array(clauses));
        }
    }
    json!({ "bool": bool_query })
}

fn render_node(node: &CriteriaNode) -> Value {
    let field = node.field().as_str();
    let boost = node.boost();
    match (node.operator(), node.value()) {
        (Operator::Equals, CriteriaValue::Single(value @ Value::String(_))) => {
            json!({ "match": { field: with_boost(json!({ "query": value, "operator": "and" }), boost) } })
        }
        (Operator::Equals, CriteriaValue::Single(value)) => {
            json!({ "term": { field: with_boost(json!({ "value": value }), boost) } })
        }
        (Operator::Contains, CriteriaValue::Single(value)) => wildcard(field, &format!("*{}*", escape(value)), boost),
        (Operator::StartsWith, CriteriaValue::Single(value)) => wildcard(field, &format!("{}*", escape(value)), boost),
        (Operator::EndsWith, CriteriaValue::Single(value)) => wildcard(field, &format!("*{}", escape(value)), boost),
        (Operator::Fuzzy, CriteriaValue::Single(value)) => {
            json!({ "fuzzy": { field: with_boost(json!({ "value": value, "fuzziness": "AUTO" }), boost) } })
        }
        (Operator::Expression, CriteriaValue::Single(value)) => json!({
            "query_string": with_boost(json!({ "query": value, "fields": [field] }), boost)
        }),
        (Operator::Between, CriteriaValue::Range { from, to }) => {
            let mut range = Map::new();
            if let Some(from) = from {
                range.insert("gte".into(), from.clone());
            }
            if let Some(to) = to {
                range.insert("lte".into(), to.clone());
            }
            json!({ "range": { field: with_boost(Value::Object(range), boost) } })
        }
        (operator @ (Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual), CriteriaValue::Single(value)) => {
            let bound = match operator {
                Operator::Less => "lt",
                Operator::LessEqual => "lte",
                Operator::Greater => "gt",
                _ => "gte",
            };
            json!({ "range": { field: with_boost(json!({ bound: value }), boost) } })
        }
        (Operator::In | Operator::NotIn, CriteriaValue::Many(values)) => {
            with_boost(json!({ "terms": { field: values } }), None)
        }
        (Operator::Within, CriteriaValue::Circle { center, radius }) => json!({
            "geo_distance": { "distance": radius.to_string(), field: center.to_value() }
        }),
        (Operator::BoundedBy, CriteriaValue::Box(bbox)) => json!({
            "geo_bounding_box": { field: {
                "top_left": bbox.top_left.to_value(),
                "bottom_right": bbox.bottom_right.to_value()
            } }
        }),
        // 🤷 shapes the builder never produces; match nothing rather than everything
        _ => json!({ "match_none": {} }),
    }
}

fn wildcard(field: &str, query: &str, boost: Option<f32>) -> Value {
    json!({
        "query_string": with_boost(json!({
            "query": query,
            "fields": [field],
            "analyze_wildcard": true
        }), boost)
    })
}

fn with_boost(mut clause: Value, boost: Option<f32>) -> Value {
    if let (Some(boost), Some(object)) = (boost, clause.as_object_mut()) {
        object.insert("boost".into(), json!(boost));
    }
    clause
}

// 🧯 query_string reserved characters, backslash-escaped
fn escape(value: &Value) -> String {
    const RESERVED: &str = r#"+-=&|><!(){}[]^"~*?:\/"#;
    let raw = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if RESERVED.contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Direction, Distance, GeoPoint};

    #[test]
    fn the_one_where_two_runs_become_a_should() {
        let criteria = Criteria::where_field("title").contains("rust")
            .and("votes").not().is(0)
            .or("tags").in_values(["borrowck"]);
        let query = render_query(&criteria);

        let should = query["bool"]["should"].as_array().expect("two runs, one should");
        assert_eq!(should.len(), 2);
        assert_eq!(query["bool"]["minimum_should_match"], json!(1));
        assert_eq!(should[0]["bool"]["must"][0]["query_string"]["query"], json!("*rust*"));
        assert_eq!(should[0]["bool"]["must_not"][0]["term"]["votes"]["value"], json!(0));
        assert_eq!(should[1]["bool"]["must"][0]["terms"]["tags"], json!(["borrowck"]));
    }

    #[test]
    fn the_one_where_a_single_run_skips_the_should_ceremony() {
        let criteria = Criteria::where_field("votes").between(1, 10)
            .and("location").within(GeoPoint::new(1.0, 2.0), Distance::km(3.0));
        let query = render_query(&criteria);
        assert!(query["bool"].get("should").is_none());
        assert_eq!(query["bool"]["must"][0]["range"]["votes"], json!({"gte": 1, "lte": 10}));
        assert_eq!(query["bool"]["filter"][0]["geo_distance"]["distance"], json!("3km"));
        assert_eq!(
            query["bool"]["filter"][0]["geo_distance"]["location"],
            json!({"lat": 1.0, "lon": 2.0})
        );
    }

    #[test]
    fn the_one_where_not_in_lands_in_must_not_and_double_negation_cancels() {
        let query = render_query(&Criteria::where_field("tags").not_in(["spam"]));
        assert_eq!(query["bool"]["must_not"][0]["terms"]["tags"], json!(["spam"]));

        let query = render_query(&Criteria::where_field("tags").not().not_in(["spam"]));
        assert_eq!(query["bool"]["must"][0]["terms"]["tags"], json!(["spam"]));
    }

    #[test]
    fn the_one_where_the_search_body_carries_sort_size_and_boost() {
        let criteria = Criteria::where_field("title").boost(3.0).is("hello");
        let body = render_search_body(
            &criteria,
            &[SortOrder::new("votes", Direction::Desc)],
            Some(10),
        );
        assert_eq!(body["size"], json!(10));
        assert_eq!(body["sort"], json!([{"votes": {"order": "desc"}}]));
        assert_eq!(body["query"]["bool"]["must"][0]["match"]["title"]["boost"], json!(3.0));
        assert_eq!(render_query(&Criteria::new()), json!({"match_all": {}}));
    }

    #[test]
    fn the_one_where_reserved_characters_get_escaped() {
        let query = render_query(&Criteria::where_field("title").starts_with("c++ (rust)"));
        assert_eq!(
            query["bool"]["must"][0]["query_string"]["query"],
            json!("c\\+\\+ \\(rust\\)*")
        );
    }
}
