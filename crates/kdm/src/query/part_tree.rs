//! 🌳 Method-name parsing.
//!
//! ```text
//!   find Top10 By NameContaining And AgeBetween Or PriceLessThan OrderBy AgeDesc
//!   ──── ───── ── ─────────────────────────────────────────────── ───────────────
//!   subj limit    OR-groups of AND-joined parts                   sort
//! ```
//!
//! Keywords are only recognized at camel-case boundaries: `Or` and `And` split only when an
//! uppercase letter follows, so `Organization` and `Android` stay whole. Nested properties may
//! use `_` as an explicit separator (`author_name`). An all-lowercase snake_case name such as
//! `find_by_title_containing` is camel-cased first.

use crate::criteria::Direction;
use crate::errors::QueryDerivationError;

use super::keywords::PredicateKeyword;

const SUBJECTS: &[(&str, SubjectKind)] = &[
    ("find", SubjectKind::Find),
    ("read", SubjectKind::Find),
    ("get", SubjectKind::Find),
    ("query", SubjectKind::Find),
    ("search", SubjectKind::Find),
    ("stream", SubjectKind::Find),
    ("count", SubjectKind::Count),
    ("exists", SubjectKind::Exists),
    ("delete", SubjectKind::Delete),
    ("remove", SubjectKind::Delete),
];

/// 🎬 What the method does with the matching documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Find,
    Count,
    Exists,
    Delete,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::Find => "find",
            SubjectKind::Count => "count",
            SubjectKind::Exists => "exists",
            SubjectKind::Delete => "delete",
        }
    }
}

/// 🧩 One predicate of the method name, e.g. `AgeBetween`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// The text as written, keyword included. Errors name this.
    pub raw: String,
    pub property: String,
    pub keyword: PredicateKeyword,
}

impl Part {
    fn parse(raw: &str) -> Part {
        let (property, keyword) = PredicateKeyword::split_suffix(raw);
        Part {
            raw: raw.to_string(),
            property: property.to_string(),
            keyword,
        }
    }
}

/// ↕️ One `OrderBy` directive, property not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPart {
    pub raw: String,
    pub property: String,
    pub direction: Direction,
}

/// 🌳 A parsed method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTree {
    pub method: String,
    pub subject: SubjectKind,
    pub distinct: bool,
    pub limit: Option<usize>,
    /// OR-ed groups, each a list of AND-ed parts. Empty means "everything".
    pub groups: Vec<Vec<Part>>,
    pub sort: Vec<OrderPart>,
}

impl PartTree {
    pub fn parse(method: &str) -> Result<PartTree, QueryDerivationError> {
        let malformed = |reason: &str| QueryDerivationError::MalformedMethodName {
            method: method.to_string(),
            reason: reason.to_string(),
        };

        let name = camelize(method.trim());
        let (prefix, subject) = SUBJECTS
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .ok_or_else(|| malformed("it does not start with find, read, get, query, search, stream, count, exists, delete or remove"))?;
        let rest = &name[prefix.len()..];
        if rest.starts_with(|c: char| c.is_lowercase()) {
            return Err(malformed("the subject prefix must be followed by an uppercase letter"));
        }
        if rest.ends_with("By") {
            return Err(malformed("it ends in 'By' with nothing to go by"));
        }

        // ↕️ OrderBy comes last and binds to nothing else
        let (head, order_clause) = match find_boundary(rest, "OrderBy") {
            Some(at) => (&rest[..at], Some(&rest[at + "OrderBy".len()..])),
            None => (rest, None),
        };

        let (subject_text, predicate) = match find_boundary(head, "By") {
            Some(at) => (&head[..at], Some(&head[at + "By".len()..])),
            None => (head, None),
        };
        let distinct = subject_text.contains("Distinct");
        let limit = parse_limit(subject_text).map_err(|reason| malformed(&reason))?;

        let groups = match predicate {
            None => Vec::new(),
            Some("") => return Err(malformed("nothing follows 'By'")),
            Some(predicate) => split_boundaries(predicate, "Or")
                .into_iter()
                .map(|group| {
                    split_boundaries(group, "And")
                        .into_iter()
                        .map(|part| {
                            if part.is_empty() {
                                Err(malformed("an And/Or has nothing on one side"))
                            } else {
                                Ok(Part::parse(part))
                            }
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let sort = match order_clause {
            None => Vec::new(),
            Some("") => return Err(malformed("nothing follows 'OrderBy'")),
            Some(clause) => parse_order(clause).map_err(|reason| malformed(&reason))?,
        };

        Ok(PartTree {
            method: method.to_string(),
            subject: *subject,
            distinct,
            limit,
            groups,
            sort,
        })
    }

    /// Every part, in argument order.
    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.groups.iter().flatten()
    }
}

/// `find_by_author_name` → `findByAuthorName`. Anything with an uppercase letter is left alone.
fn camelize(method: &str) -> String {
    if !method.contains('_') || method.chars().any(char::is_uppercase) {
        return method.to_string();
    }
    let mut out = String::with_capacity(method.len());
    let mut upper_next = false;
    for c in method.chars() {
        match c {
            '_' => upper_next = true,
            c if upper_next => {
                out.extend(c.to_uppercase());
                upper_next = false;
            }
            c => out.push(c),
        }
    }
    out
}

fn at_boundary(text: &str, end: usize) -> bool {
    text[end..]
        .chars()
        .next()
        .is_some_and(|next| next.is_uppercase() || !next.is_ascii())
}

/// First `keyword` in `text` that is followed by an uppercase letter.
fn find_boundary(text: &str, keyword: &str) -> Option<usize> {
    text.match_indices(keyword)
        .map(|(at, _)| at)
        .find(|at| at_boundary(text, at + keyword.len()))
}

/// Split at every `keyword` followed by an uppercase letter.
fn split_boundaries<'a>(text: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (at, _) in text.match_indices(keyword) {
        if at >= start && at_boundary(text, at + keyword.len()) {
            pieces.push(&text[start..at]);
            start = at + keyword.len();
        }
    }
    pieces.push(&text[start..]);
    pieces
}

/// `Top10`, `First`, `DistinctTop3` → the limit. `First`/`Top` alone mean one.
fn parse_limit(subject: &str) -> Result<Option<usize>, String> {
    for marker in ["Top", "First"] {
        let Some(at) = find_marker(subject, marker) else {
            continue;
        };
        let digits: String = subject[at + marker.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if digits.is_empty() {
            return Ok(Some(1));
        }
        return match digits.parse::<usize>() {
            Ok(0) => Err(format!("'{marker}0' asks for nothing")),
            Ok(limit) => Ok(Some(limit)),
            Err(_) => Err(format!("'{marker}{digits}' is not a usable limit")),
        };
    }
    Ok(None)
}

/// `Top` followed by digits, an uppercase letter or nothing.
fn find_marker(subject: &str, marker: &str) -> Option<usize> {
    subject.match_indices(marker).map(|(at, _)| at).find(|at| {
        subject[at + marker.len()..]
            .chars()
            .next()
            .is_none_or(|next| next.is_ascii_digit() || next.is_uppercase())
    })
}

/// `AgeDescNameAsc` → [(Age, desc), (Name, asc)]. A trailing property without direction is ascending.
fn parse_order(clause: &str) -> Result<Vec<OrderPart>, String> {
    let mut orders = Vec::new();
    let mut start = 0;
    let mut cursor = 0;
    while cursor < clause.len() {
        let rest = &clause[cursor..];
        let direction = [("Desc", Direction::Desc), ("Asc", Direction::Asc)]
            .into_iter()
            .find(|(word, _)| {
                rest.starts_with(word)
                    && (cursor + word.len() == clause.len() || at_boundary(clause, cursor + word.len()))
                    && cursor > start
            });
        match direction {
            Some((word, direction)) => {
                let property = &clause[start..cursor];
                orders.push(OrderPart {
                    raw: format!("{property}{word}"),
                    property: property.to_string(),
                    direction,
                });
                cursor += word.len();
                start = cursor;
            }
            None => cursor += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    if start < clause.len() {
        let property = &clause[start..];
        orders.push(OrderPart {
            raw: property.to_string(),
            property: property.to_string(),
            direction: Direction::Asc,
        });
    }
    if orders.is_empty() {
        return Err("the OrderBy clause names no property".to_string());
    }
    Ok(orders)
}
