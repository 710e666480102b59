//! 💀 Errors: the taxonomy of things going sideways, sorted by how loudly they should scream.
//!
//! 🧠 Knowledge graph:
//! - `ConfigurationError`: fatal, raised while a document type is being described. Fix the config, restart.
//! - `QueryDerivationError`: fatal per call. A method name that does not parse never becomes half a query.
//! - `NamingCollisionError`: the next rollover index name is already taken. Fatal for that tick only.
//! - `RolloverAttemptError`: one scheduled tick went wrong. Logged, recorded, retried next tick.
//! - `OperationError`: what the repository-facing API hands back, config or query flavored.
//!
//! Collaborator code (HTTP, config files, CLI) stays on `anyhow` like the rest of the house.
//! These typed ones exist because callers genuinely match on them. 🦆

use thiserror::Error;

/// 🔧 Something is wrong with how a document type was described.
///
/// Raised at registration time, never at use time. There is no automatic recovery:
/// the offending document type gets fixed and the process gets restarted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(
        "💀 Document type '{document_type}' marks both '{first}' and '{second}' as its {role} field. \
         One role, one field. Pick a favorite."
    )]
    DuplicateFieldRole {
        document_type: String,
        role: String,
        first: String,
        second: String,
    },

    #[error(
        "💀 Document type '{document_type}' opts into rollover but sets no condition. \
         At least one of max_age, max_docs or max_size is required, otherwise it would never roll."
    )]
    EmptyRolloverConditions { document_type: String },

    #[error("💀 Document type '{document_type}' declares a time pattern, but it resolved to an empty string.")]
    EmptyTimePattern { document_type: String },

    #[error("💀 Document type '{document_type}' declares a time pattern '{pattern}' that strftime cannot read.")]
    InvalidTimePattern {
        document_type: String,
        pattern: String,
    },

    #[error("💀 Document type '{document_type}' has a rollover block without a write alias name.")]
    EmptyWriteAlias { document_type: String },

    #[error("💀 Document type '{document_type}' resolved to an empty index name. Nowhere to write, nowhere to read.")]
    EmptyIndexName { document_type: String },

    #[error("💀 Document type '{document_type}' names '{field}' as its time field, but no such field is declared.")]
    UnknownTimeField {
        document_type: String,
        field: String,
    },

    #[error("💀 Document type '{document_type}' declares field '{field}' twice.")]
    DuplicateField {
        document_type: String,
        field: String,
    },

    #[error("💀 '{value}' is not a duration we understand. Try something like 30s, 15m, 12h or 30d.")]
    InvalidDuration { value: String },

    #[error("💀 '{value}' is not a byte size we understand. Try something like 512mb or 5gb.")]
    InvalidByteSize { value: String },

    #[error("💀 '{value}' is not a schedule we understand. Try '@every 1h', '@daily', '0 */15 * * * *' or just '15m'.")]
    InvalidSchedule { value: String },

    #[error(
        "💀 Document type '{document_type}' is a child of '{parent}' but has neither a routing field \
         nor a parent-id field. Children must land on their parent's shard."
    )]
    MissingParentRouting {
        document_type: String,
        parent: String,
    },

    #[error("💀 Document type '{document_type}' names '{field}' as its routing field, but no such field is declared.")]
    UnknownRoutingField {
        document_type: String,
        field: String,
    },

    #[error("💀 No document type named '{document_type}' is registered.")]
    UnknownDocumentType { document_type: String },

    #[error("💀 Document type '{document_type}' is not rollover backed, so there is nothing to roll.")]
    NotRolloverBacked { document_type: String },
}

/// 🔍 A method description that cannot become a query.
///
/// Always surfaced synchronously, always names the offending token. Never downgraded
/// to a partial query, because a partial query is just a wrong answer with extra steps.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryDerivationError {
    #[error("💀 Method name '{method}' cannot be derived: {reason}")]
    MalformedMethodName { method: String, reason: String },

    #[error("💀 Token '{token}' uses predicate '{keyword}', which the engine has no query for.")]
    UnsupportedPredicate { token: String, keyword: String },

    #[error("💀 Token '{token}' refers to property '{property}', which the document type does not declare.")]
    MissingProperty { token: String, property: String },

    #[error("💀 Token '{token}' needs {expected} argument(s) but only {actual} were left.")]
    ArityMismatch {
        token: String,
        expected: usize,
        actual: usize,
    },

    #[error("💀 Token '{token}' got an argument it cannot use: {reason}")]
    InvalidArgument { token: String, reason: String },

    #[error("💀 Method '{method}' consumed {consumed} argument(s) but {supplied} were supplied.")]
    TrailingArguments {
        method: String,
        consumed: usize,
        supplied: usize,
    },

    #[error("💀 Sort token '{token}' refers to property '{property}', which the document type does not declare.")]
    UnknownSortProperty { token: String, property: String },
}

/// 🚧 The deterministic next index name already exists.
///
/// We never dodge this by inventing another name. Silent renaming is how aliases
/// end up pointing at indices nobody can explain at 3am.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "💀 Rollover of '{document_type}' wanted to create index '{index}', but it already exists. \
     Someone or something got there first. Refusing to improvise a different name."
)]
pub struct NamingCollisionError {
    pub document_type: String,
    pub index: String,
}

/// 🔄 One scheduled rollover tick did not make it.
///
/// Recoverable: the next tick starts from scratch.
#[derive(Debug, Error)]
pub enum RolloverAttemptError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Collision(#[from] NamingCollisionError),

    #[error("💀 Write alias '{alias}' of '{document_type}' does not point at any index. Was it bootstrapped?")]
    NoWriteIndex {
        document_type: String,
        alias: String,
    },

    /// 📡 the engine (or the network in front of it) said no
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

/// 🚪 What the repository-facing API returns when a call cannot even be formulated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Query(#[from] QueryDerivationError),

    #[error("💀 A '{document_type}' record could not be mapped to an engine document: {reason}")]
    Mapping { document_type: String, reason: String },
}
