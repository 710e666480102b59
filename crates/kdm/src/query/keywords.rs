//! 🔑 Predicate keywords: the suffix that says what a method-name part asks of its property.

use crate::criteria::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKeyword {
    Simple,
    Negating,
    Between,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Before,
    After,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    NotContaining,
    In,
    NotIn,
    True,
    False,
    Regex,
    Fuzzy,
    Near,
    Within,
    // 🚫 recognized so they do not end up glued to a property name, rejected when compiled
    Exists,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
}

/// Every spelling, any order. Parsing picks the longest matching suffix.
const SPELLINGS: &[(&str, PredicateKeyword)] = &[
    ("Is", PredicateKeyword::Simple),
    ("Equals", PredicateKeyword::Simple),
    ("IsNot", PredicateKeyword::Negating),
    ("Not", PredicateKeyword::Negating),
    ("IsBetween", PredicateKeyword::Between),
    ("Between", PredicateKeyword::Between),
    ("IsLessThan", PredicateKeyword::LessThan),
    ("LessThan", PredicateKeyword::LessThan),
    ("IsLessThanEqual", PredicateKeyword::LessThanEqual),
    ("LessThanEqual", PredicateKeyword::LessThanEqual),
    ("IsGreaterThan", PredicateKeyword::GreaterThan),
    ("GreaterThan", PredicateKeyword::GreaterThan),
    ("IsGreaterThanEqual", PredicateKeyword::GreaterThanEqual),
    ("GreaterThanEqual", PredicateKeyword::GreaterThanEqual),
    ("IsBefore", PredicateKeyword::Before),
    ("Before", PredicateKeyword::Before),
    ("IsAfter", PredicateKeyword::After),
    ("After", PredicateKeyword::After),
    ("IsLike", PredicateKeyword::Like),
    ("Like", PredicateKeyword::Like),
    ("IsNotLike", PredicateKeyword::NotLike),
    ("NotLike", PredicateKeyword::NotLike),
    ("IsStartingWith", PredicateKeyword::StartingWith),
    ("StartingWith", PredicateKeyword::StartingWith),
    ("StartsWith", PredicateKeyword::StartingWith),
    ("IsEndingWith", PredicateKeyword::EndingWith),
    ("EndingWith", PredicateKeyword::EndingWith),
    ("EndsWith", PredicateKeyword::EndingWith),
    ("IsContaining", PredicateKeyword::Containing),
    ("Containing", PredicateKeyword::Containing),
    ("Contains", PredicateKeyword::Containing),
    ("IsNotContaining", PredicateKeyword::NotContaining),
    ("NotContaining", PredicateKeyword::NotContaining),
    ("NotContains", PredicateKeyword::NotContaining),
    ("IsIn", PredicateKeyword::In),
    ("In", PredicateKeyword::In),
    ("IsNotIn", PredicateKeyword::NotIn),
    ("NotIn", PredicateKeyword::NotIn),
    ("IsTrue", PredicateKeyword::True),
    ("True", PredicateKeyword::True),
    ("IsFalse", PredicateKeyword::False),
    ("False", PredicateKeyword::False),
    ("MatchesRegex", PredicateKeyword::Regex),
    ("Matches", PredicateKeyword::Regex),
    ("Regex", PredicateKeyword::Regex),
    ("IsFuzzy", PredicateKeyword::Fuzzy),
    ("Fuzzy", PredicateKeyword::Fuzzy),
    ("IsNear", PredicateKeyword::Near),
    ("Near", PredicateKeyword::Near),
    ("IsWithin", PredicateKeyword::Within),
    ("Within", PredicateKeyword::Within),
    ("Exists", PredicateKeyword::Exists),
    ("IsNull", PredicateKeyword::IsNull),
    ("Null", PredicateKeyword::IsNull),
    ("IsNotNull", PredicateKeyword::IsNotNull),
    ("NotNull", PredicateKeyword::IsNotNull),
    ("IsEmpty", PredicateKeyword::IsEmpty),
    ("Empty", PredicateKeyword::IsEmpty),
    ("IsNotEmpty", PredicateKeyword::IsNotEmpty),
    ("NotEmpty", PredicateKeyword::IsNotEmpty),
];

impl PredicateKeyword {
    pub const ALL: [PredicateKeyword; 28] = [
        PredicateKeyword::Simple,
        PredicateKeyword::Negating,
        PredicateKeyword::Between,
        PredicateKeyword::LessThan,
        PredicateKeyword::LessThanEqual,
        PredicateKeyword::GreaterThan,
        PredicateKeyword::GreaterThanEqual,
        PredicateKeyword::Before,
        PredicateKeyword::After,
        PredicateKeyword::Like,
        PredicateKeyword::NotLike,
        PredicateKeyword::StartingWith,
        PredicateKeyword::EndingWith,
        PredicateKeyword::Containing,
        PredicateKeyword::NotContaining,
        PredicateKeyword::In,
        PredicateKeyword::NotIn,
        PredicateKeyword::True,
        PredicateKeyword::False,
        PredicateKeyword::Regex,
        PredicateKeyword::Fuzzy,
        PredicateKeyword::Near,
        PredicateKeyword::Within,
        PredicateKeyword::Exists,
        PredicateKeyword::IsNull,
        PredicateKeyword::IsNotNull,
        PredicateKeyword::IsEmpty,
        PredicateKeyword::IsNotEmpty,
    ];

    /// ✂️ Split `part` into (property, keyword) using the longest keyword suffix that leaves a
    /// non-empty property. No suffix at all means plain equality.
    pub fn split_suffix(part: &str) -> (&str, PredicateKeyword) {
        SPELLINGS
            .iter()
            .filter(|(spelling, _)| part.len() > spelling.len() && part.ends_with(spelling))
            .max_by_key(|(spelling, _)| spelling.len())
            .map(|(spelling, keyword)| (&part[..part.len() - spelling.len()], *keyword))
            .unwrap_or((part, PredicateKeyword::Simple))
    }

    /// 🎯 The operator and negation a keyword compiles to, where that is fixed.
    ///
    /// `None` for the geo keywords (their operator depends on the arguments) and for the
    /// unsupported ones. Equality on a geo field is rewritten later, by the compiler.
    pub fn operator(self) -> Option<(Operator, bool)> {
        let mapped = match self {
            PredicateKeyword::Simple | PredicateKeyword::True | PredicateKeyword::False => (Operator::Equals, false),
            PredicateKeyword::Negating => (Operator::Equals, true),
            PredicateKeyword::Between => (Operator::Between, false),
            PredicateKeyword::LessThan => (Operator::Less, false),
            PredicateKeyword::LessThanEqual | PredicateKeyword::Before => (Operator::LessEqual, false),
            PredicateKeyword::GreaterThan => (Operator::Greater, false),
            PredicateKeyword::GreaterThanEqual | PredicateKeyword::After => (Operator::GreaterEqual, false),
            PredicateKeyword::Like | PredicateKeyword::StartingWith => (Operator::StartsWith, false),
            PredicateKeyword::NotLike => (Operator::StartsWith, true),
            PredicateKeyword::EndingWith => (Operator::EndsWith, false),
            PredicateKeyword::Containing => (Operator::Contains, false),
            PredicateKeyword::NotContaining => (Operator::Contains, true),
            PredicateKeyword::In => (Operator::In, false),
            PredicateKeyword::NotIn => (Operator::NotIn, false),
            PredicateKeyword::Regex => (Operator::Expression, false),
            PredicateKeyword::Fuzzy => (Operator::Fuzzy, false),
            PredicateKeyword::Near
            | PredicateKeyword::Within
            | PredicateKeyword::Exists
            | PredicateKeyword::IsNull
            | PredicateKeyword::IsNotNull
            | PredicateKeyword::IsEmpty
            | PredicateKeyword::IsNotEmpty => return None,
        };
        Some(mapped)
    }

    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            PredicateKeyword::Exists
                | PredicateKeyword::IsNull
                | PredicateKeyword::IsNotNull
                | PredicateKeyword::IsEmpty
                | PredicateKeyword::IsNotEmpty
        )
    }

    /// How many arguments the keyword takes. Geo keywords take one (a box) or two.
    pub fn arity(self) -> usize {
        match self {
            PredicateKeyword::True | PredicateKeyword::False => 0,
            PredicateKeyword::Between | PredicateKeyword::Near | PredicateKeyword::Within => 2,
            PredicateKeyword::Exists
            | PredicateKeyword::IsNull
            | PredicateKeyword::IsNotNull
            | PredicateKeyword::IsEmpty
            | PredicateKeyword::IsNotEmpty => 0,
            _ => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PredicateKeyword::Simple => "Is",
            PredicateKeyword::Negating => "IsNot",
            PredicateKeyword::Between => "Between",
            PredicateKeyword::LessThan => "LessThan",
            PredicateKeyword::LessThanEqual => "LessThanEqual",
            PredicateKeyword::GreaterThan => "GreaterThan",
            PredicateKeyword::GreaterThanEqual => "GreaterThanEqual",
            PredicateKeyword::Before => "Before",
            PredicateKeyword::After => "After",
            PredicateKeyword::Like => "Like",
            PredicateKeyword::NotLike => "NotLike",
            PredicateKeyword::StartingWith => "StartingWith",
            PredicateKeyword::EndingWith => "EndingWith",
            PredicateKeyword::Containing => "Containing",
            PredicateKeyword::NotContaining => "NotContaining",
            PredicateKeyword::In => "In",
            PredicateKeyword::NotIn => "NotIn",
            PredicateKeyword::True => "True",
            PredicateKeyword::False => "False",
            PredicateKeyword::Regex => "Regex",
            PredicateKeyword::Fuzzy => "Fuzzy",
            PredicateKeyword::Near => "Near",
            PredicateKeyword::Within => "Within",
            PredicateKeyword::Exists => "Exists",
            PredicateKeyword::IsNull => "IsNull",
            PredicateKeyword::IsNotNull => "IsNotNull",
            PredicateKeyword::IsEmpty => "IsEmpty",
            PredicateKeyword::IsNotEmpty => "IsNotEmpty",
        }
    }
}
