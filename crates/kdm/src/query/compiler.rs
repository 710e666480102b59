//! ⚙️ PartTree + resolver + arguments → CompiledQuery.
//!
//! Arguments are consumed strictly left to right, in the order the parts appear. Each part
//! takes as many as its keyword needs. Too few is an arity error naming the part; leftovers
//! at the end are an error naming the method.
//!
//! Two rewrites happen here rather than in the keyword table:
//! - equality on a geo field becomes `WITHIN` [`EXACT_POINT_RADIUS`] of the point, since
//!   engines have no point-equality query
//! - `Near`/`Within` pick their operator from the argument shapes: a box, or two points, mean
//!   `BOUNDED_BY`; a point and a distance mean `WITHIN`

use serde_json::Value;
use tracing::trace;

use super::keywords::PredicateKeyword;
use super::part_tree::{Part, PartTree};
use super::{CompiledQuery, Parameter, PropertyPathResolver, ResolvedProperty};
use crate::criteria::{
    Criteria, CriteriaBuilder, Distance, DistanceUnit, GeoBox, GeoPoint, Operator, SortOrder,
};
use crate::errors::QueryDerivationError;

/// 🎯 "Effectively this exact point": one meter.
pub const EXACT_POINT_RADIUS: Distance = Distance {
    value: 0.001,
    unit: DistanceUnit::Kilometers,
};

/// 🚀 Parse and compile in one go.
pub fn compile_method(
    method: &str,
    resolver: &dyn PropertyPathResolver,
    arguments: &[Parameter],
) -> Result<CompiledQuery, QueryDerivationError> {
    compile(&PartTree::parse(method)?, resolver, arguments)
}

pub fn compile(
    tree: &PartTree,
    resolver: &dyn PropertyPathResolver,
    arguments: &[Parameter],
) -> Result<CompiledQuery, QueryDerivationError> {
    let mut cursor = Arguments {
        values: arguments,
        position: 0,
    };
    let mut criteria = Criteria::new();

    for (group_index, group) in tree.groups.iter().enumerate() {
        for (part_index, part) in group.iter().enumerate() {
            let (resolved, keyword) = resolve_part(part, resolver)?;
            // 🔀 the first part of every group after the first opens an OR-run
            let builder = if group_index > 0 && part_index == 0 {
                criteria.or(resolved.path.clone())
            } else {
                criteria.and(resolved.path.clone())
            };
            criteria = apply(builder, part, keyword, &resolved, &mut cursor)?;
        }
    }

    if cursor.position < arguments.len() {
        return Err(QueryDerivationError::TrailingArguments {
            method: tree.method.clone(),
            consumed: cursor.position,
            supplied: arguments.len(),
        });
    }

    let sort = tree
        .sort
        .iter()
        .map(|order| {
            resolver
                .resolve(&order.property)
                .map(|resolved| SortOrder::new(resolved.path, order.direction))
                .ok_or_else(|| QueryDerivationError::UnknownSortProperty {
                    token: order.raw.clone(),
                    property: order.property.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    trace!("🔍 Compiled '{}' into: {}", tree.method, criteria);
    Ok(CompiledQuery {
        subject: tree.subject,
        criteria,
        sort,
        limit: tree.limit,
    })
}

/// 🧭 Resolve the part's property. When that fails, the whole token gets a second chance as
/// a plain-equality property (`Domain` is a field, not `Doma` + `In`).
fn resolve_part(
    part: &Part,
    resolver: &dyn PropertyPathResolver,
) -> Result<(ResolvedProperty, PredicateKeyword), QueryDerivationError> {
    if let Some(resolved) = resolver.resolve(&part.property) {
        return Ok((resolved, part.keyword));
    }
    if part.keyword != PredicateKeyword::Simple {
        if let Some(resolved) = resolver.resolve(&part.raw) {
            return Ok((resolved, PredicateKeyword::Simple));
        }
    }
    Err(QueryDerivationError::MissingProperty {
        token: part.raw.clone(),
        property: part.property.clone(),
    })
}

fn apply(
    builder: CriteriaBuilder,
    part: &Part,
    keyword: PredicateKeyword,
    resolved: &ResolvedProperty,
    cursor: &mut Arguments<'_>,
) -> Result<Criteria, QueryDerivationError> {
    let token = part.raw.as_str();
    if !keyword.is_supported() {
        return Err(QueryDerivationError::UnsupportedPredicate {
            token: token.to_string(),
            keyword: keyword.as_str().to_string(),
        });
    }

    if matches!(keyword, PredicateKeyword::Near | PredicateKeyword::Within) {
        return geo_proximity(builder, token, cursor);
    }

    let Some((operator, negated)) = keyword.operator() else {
        return Err(QueryDerivationError::UnsupportedPredicate {
            token: token.to_string(),
            keyword: keyword.as_str().to_string(),
        });
    };
    let builder = if negated { builder.not() } else { builder };

    let criteria = match (keyword, operator) {
        (PredicateKeyword::True, _) => builder.is(true),
        (PredicateKeyword::False, _) => builder.is(false),
        // 🌍 no point-equality in geo land: "exactly here" means "within a meter of here"
        (_, Operator::Equals) if resolved.field_type.is_geo() => {
            let point = point_argument(token, cursor.take(token, 1)?[0].clone())?;
            builder.within(point, EXACT_POINT_RADIUS)
        }
        (_, Operator::Equals) => builder.is(scalar(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::Between) => {
            let bounds = cursor.take(token, 2)?;
            let from = scalar(token, &bounds[0])?;
            let to = scalar(token, &bounds[1])?;
            builder.between_bounds((!from.is_null()).then_some(from), (!to.is_null()).then_some(to))
        }
        (_, Operator::Less) => builder.less_than(scalar(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::LessEqual) => builder.less_than_equal(scalar(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::Greater) => builder.greater_than(scalar(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::GreaterEqual) => builder.greater_than_equal(scalar(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::StartsWith) => builder.starts_with(text(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::EndsWith) => builder.ends_with(text(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::Contains) => builder.contains(text(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::Fuzzy) => builder.fuzzy(text(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::Expression) => builder.expression(text(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::In) => builder.in_values(list(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::NotIn) => builder.not_in(list(token, &cursor.take(token, 1)?[0])?),
        (_, Operator::Within | Operator::BoundedBy) => {
            return Err(QueryDerivationError::UnsupportedPredicate {
                token: token.to_string(),
                keyword: keyword.as_str().to_string(),
            });
        }
    };
    Ok(criteria)
}

/// 📍 `Near` / `Within`: (box) or (point, point) → BOUNDED_BY, (point, distance) → WITHIN.
fn geo_proximity(
    builder: CriteriaBuilder,
    token: &str,
    cursor: &mut Arguments<'_>,
) -> Result<Criteria, QueryDerivationError> {
    let first = cursor.take(token, 1)?[0].clone();
    if let Parameter::Box(bbox) = first {
        return Ok(builder.bounded_by(bbox));
    }
    let anchor = point_argument(token, first)?;
    let second = cursor.take(token, 1)?[0].clone();
    match second {
        Parameter::Distance(radius) => Ok(builder.within(anchor, radius)),
        Parameter::Value(Value::String(raw)) if raw.parse::<Distance>().is_ok() => {
            let radius = raw
                .parse::<Distance>()
                .map_err(|reason| invalid(token, reason))?;
            Ok(builder.within(anchor, radius))
        }
        other => {
            let corner = point_argument(token, other)?;
            Ok(builder.bounded_by(GeoBox::new(anchor, corner)))
        }
    }
}

/// 🎒 The positional arguments and how far we got.
struct Arguments<'a> {
    values: &'a [Parameter],
    position: usize,
}

impl<'a> Arguments<'a> {
    fn take(&mut self, token: &str, count: usize) -> Result<&'a [Parameter], QueryDerivationError> {
        let remaining = self.values.len() - self.position;
        if remaining < count {
            return Err(QueryDerivationError::ArityMismatch {
                token: token.to_string(),
                expected: count,
                actual: remaining,
            });
        }
        let taken = &self.values[self.position..self.position + count];
        self.position += count;
        Ok(taken)
    }
}

fn invalid(token: &str, reason: impl Into<String>) -> QueryDerivationError {
    QueryDerivationError::InvalidArgument {
        token: token.to_string(),
        reason: reason.into(),
    }
}

fn scalar(token: &str, parameter: &Parameter) -> Result<Value, QueryDerivationError> {
    match parameter {
        Parameter::Value(value) => Ok(value.clone()),
        other => Err(invalid(token, format!("expected a plain value, got {}", other.describe()))),
    }
}

fn text(token: &str, parameter: &Parameter) -> Result<String, QueryDerivationError> {
    match parameter {
        Parameter::Value(Value::String(text)) => Ok(text.clone()),
        Parameter::Value(value @ (Value::Number(_) | Value::Bool(_))) => Ok(value.to_string()),
        other => Err(invalid(token, format!("expected text, got {}", other.describe()))),
    }
}

/// A collection argument. A lone scalar is a collection of one.
fn list(token: &str, parameter: &Parameter) -> Result<Vec<Value>, QueryDerivationError> {
    match parameter {
        Parameter::List(values) => Ok(values.clone()),
        Parameter::Value(Value::Array(values)) => Ok(values.clone()),
        Parameter::Value(Value::Null) => Err(invalid(token, "expected a collection, got null")),
        Parameter::Value(value) => Ok(vec![value.clone()]),
        other => Err(invalid(token, format!("expected a collection, got {}", other.describe()))),
    }
}

fn point_argument(token: &str, parameter: Parameter) -> Result<GeoPoint, QueryDerivationError> {
    match parameter {
        Parameter::Point(point) => Ok(point),
        Parameter::Value(value) => GeoPoint::from_value(&value)
            .ok_or_else(|| invalid(token, format!("expected a point, got {value}"))),
        other => Err(invalid(token, format!("expected a point, got {}", other.describe()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Conjunction, CriteriaValue, Direction};
    use crate::entity::{DocumentTypeConfig, EntityDescriptor, FieldConfig, FieldType};
    use crate::placeholders::MapEnvironment;
    use crate::query::SubjectKind;
    use serde_json::json;

    fn question() -> EntityDescriptor {
        let config = DocumentTypeConfig::new("Question")
            .field(FieldConfig::new("title", FieldType::Text))
            .field(FieldConfig::new("votes", FieldType::Integer))
            .field(FieldConfig::new("price", FieldType::Double))
            .field(FieldConfig::new("domain", FieldType::Keyword))
            .field(FieldConfig::new("tags", FieldType::Keyword))
            .field(FieldConfig::new("answered", FieldType::Boolean))
            .field(FieldConfig::new("asked_at", FieldType::Date).engine_name("askedAt"))
            .field(FieldConfig::new("location", FieldType::GeoPoint))
            .field(
                FieldConfig::new("author", FieldType::Object)
                    .property(FieldConfig::new("display_name", FieldType::Keyword).engine_name("displayName")),
            );
        EntityDescriptor::build(&config, &MapEnvironment::default()).expect("question should build")
    }

    fn args(values: &[Value]) -> Vec<Parameter> {
        values.iter().cloned().map(Parameter::from_json).collect()
    }

    #[test]
    fn the_one_where_a_and_b_or_c_flattens_into_two_runs() {
        let compiled = compile_method(
            "findByTitleAndVotesOrTags",
            &question(),
            &args(&[json!("rust"), json!(3), json!("borrowck")]),
        )
        .expect("should compile");

        let conjunctions: Vec<Conjunction> =
            compiled.criteria.nodes().iter().map(|node| node.conjunction()).collect();
        assert_eq!(conjunctions, vec![Conjunction::And, Conjunction::And, Conjunction::Or]);
        assert_eq!(compiled.criteria.to_string(), r#"title EQUALS "rust" AND votes EQUALS 3 OR tags EQUALS "borrowck""#);

        // 🧪 A false, B false, C true: (A AND B) OR C matches, A AND (B OR C) would not
        let doc = json!({"title": "go", "votes": 1, "tags": ["borrowck"]});
        assert!(compiled.criteria.matches(&doc));
        let doc = json!({"title": "rust", "votes": 1, "tags": ["gc"]});
        assert!(!compiled.criteria.matches(&doc));
    }

    #[test]
    fn the_one_where_geo_equality_becomes_a_tiny_circle() {
        let compiled = compile_method(
            "findByLocation",
            &question(),
            &[Parameter::Point(GeoPoint::new(52.52, 13.405))],
        )
        .expect("should compile");
        let node = &compiled.criteria.nodes()[0];
        assert_eq!(node.operator(), Operator::Within);
        assert_ne!(node.operator(), Operator::Equals);
        assert_eq!(
            node.value(),
            &CriteriaValue::Circle {
                center: GeoPoint::new(52.52, 13.405),
                radius: EXACT_POINT_RADIUS
            }
        );

        let negated = compile_method("findByLocationNot", &question(), &args(&[json!("52.52,13.405")]))
            .expect("should compile");
        assert_eq!(negated.criteria.nodes()[0].operator(), Operator::Within);
        assert!(negated.criteria.nodes()[0].is_negated());
    }

    #[test]
    fn the_one_where_near_and_within_read_their_arguments() {
        let q = question();
        let berlin = json!({"lat": 52.52, "lon": 13.405});

        let within = compile_method("findByLocationWithin", &q, &args(&[berlin.clone(), json!("5km")]))
            .expect("point + distance string");
        assert_eq!(within.criteria.nodes()[0].operator(), Operator::Within);

        let near = compile_method(
            "findByLocationNear",
            &q,
            &[Parameter::Point(GeoPoint::new(1.0, 2.0)), Parameter::Distance(Distance::km(3.0))],
        )
        .expect("point + distance");
        assert_eq!(near.criteria.nodes()[0].operator(), Operator::Within);

        let two_points = compile_method("findByLocationNear", &q, &args(&[json!([0.0, 10.0]), json!([10.0, 0.0])]))
            .expect("two points make a box");
        assert_eq!(two_points.criteria.nodes()[0].operator(), Operator::BoundedBy);

        let bbox = compile_method(
            "findByLocationWithin",
            &q,
            &args(&[json!({"top_left": {"lat": 10.0, "lon": 0.0}, "bottom_right": {"lat": 0.0, "lon": 10.0}})]),
        )
        .expect("a box is enough");
        assert_eq!(bbox.criteria.nodes()[0].operator(), Operator::BoundedBy);
        assert_eq!(bbox.criteria.len(), 1);
    }

    #[test]
    fn the_one_where_keywords_land_on_their_operators() {
        let q = question();
        let compiled = compile_method(
            "findTop5ByTitleContainingAndVotesBetweenAndAskedAtBeforeAndPriceAfterAndTagsNotInAndAnsweredTrueAndAuthorDisplayNameStartingWithOrderByVotesDesc",
            &q,
            &args(&[
                json!("lifetimes"),
                json!(1),
                json!(10),
                json!("2026-01-01"),
                json!(0.5),
                json!(["spam"]),
                json!("fer"),
            ]),
        )
        .expect("should compile");

        let operators: Vec<(String, Operator, bool)> = compiled
            .criteria
            .nodes()
            .iter()
            .map(|node| (node.field().to_string(), node.operator(), node.is_negated()))
            .collect();
        assert_eq!(
            operators,
            vec![
                ("title".to_string(), Operator::Contains, false),
                ("votes".to_string(), Operator::Between, false),
                ("askedAt".to_string(), Operator::LessEqual, false),
                ("price".to_string(), Operator::GreaterEqual, false),
                ("tags".to_string(), Operator::NotIn, false),
                ("answered".to_string(), Operator::Equals, false),
                ("author.displayName".to_string(), Operator::StartsWith, false),
            ]
        );
        assert_eq!(compiled.limit, Some(5));
        assert_eq!(compiled.subject, SubjectKind::Find);
        assert_eq!(compiled.sort, vec![SortOrder::new("votes", Direction::Desc)]);
    }

    #[test]
    fn the_one_where_a_property_that_looks_like_a_keyword_still_resolves() {
        // 🪤 "DomainIn"? no: "Domain" = "Doma" + "In" fails, the whole token is the property
        let compiled = compile_method("findByDomain", &question(), &args(&[json!("rust-lang.org")]))
            .expect("should compile");
        assert_eq!(compiled.criteria.nodes()[0].field().as_str(), "domain");
        assert_eq!(compiled.criteria.nodes()[0].operator(), Operator::Equals);
    }

    #[test]
    fn the_one_where_bad_calls_name_the_guilty_token() {
        let q = question();
        assert_eq!(
            compile_method("findByVotesBetween", &q, &args(&[json!(1)])),
            Err(QueryDerivationError::ArityMismatch {
                token: "VotesBetween".into(),
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            compile_method("findByNonsenseContaining", &q, &args(&[json!("x")])),
            Err(QueryDerivationError::MissingProperty {
                token: "NonsenseContaining".into(),
                property: "Nonsense".into()
            })
        );
        assert!(matches!(
            compile_method("findByTitleIsNull", &q, &[]),
            Err(QueryDerivationError::UnsupportedPredicate { token, .. }) if token == "TitleIsNull"
        ));
        assert!(matches!(
            compile_method("findByTitle", &q, &args(&[json!("a"), json!("b")])),
            Err(QueryDerivationError::TrailingArguments { consumed: 1, supplied: 2, .. })
        ));
        assert!(matches!(
            compile_method("findByTitleOrderByNopeAsc", &q, &args(&[json!("a")])),
            Err(QueryDerivationError::UnknownSortProperty { .. })
        ));
        assert!(matches!(
            compile_method("findByLocationNear", &q, &args(&[json!("not a point"), json!("5km")])),
            Err(QueryDerivationError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn the_one_where_every_supported_keyword_compiles_without_complaint() {
        let q = question();
        for keyword in PredicateKeyword::ALL.into_iter().filter(|k| k.is_supported()) {
            let (property, arguments) = match keyword {
                PredicateKeyword::Near | PredicateKeyword::Within => {
                    ("Location", args(&[json!([13.4, 52.5]), json!("1km")]))
                }
                PredicateKeyword::True | PredicateKeyword::False => ("Answered", vec![]),
                PredicateKeyword::Between => ("Votes", args(&[json!(1), json!(2)])),
                PredicateKeyword::In | PredicateKeyword::NotIn => ("Tags", args(&[json!(["a"])])),
                _ => ("Title", args(&[json!("x")])),
            };
            let method = format!("findBy{property}{}", keyword.as_str());
            assert!(
                compile_method(&method, &q, &arguments).is_ok(),
                "{method} should compile"
            );
        }
    }
}
