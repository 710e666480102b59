//! 📡 The engine seam: everything that actually talks to a search cluster goes through
//! [`NetworkClient`].
//!
//! 🧠 Knowledge graph:
//! - The core (router, compiler, evaluator) decides *what* to ask and *which name* to use.
//!   Implementations of this trait do the asking.
//! - [`ElasticsearchClient`] speaks REST over `reqwest`. [`InMemoryEngine`] keeps indices in a
//!   map and answers searches with `Criteria::matches`; tests and the CLI's dry runs use it.
//! - Errors here are `anyhow` with context strings. Callers that need a typed error
//!   (`RolloverAttemptError::Engine`) wrap them.
//!
//! ```text
//!   DocumentOperations ──┐
//!   RolloverTrigger ─────┼──► dyn NetworkClient ──► ElasticsearchClient ──► 🌐 cluster
//!                        │                      └─► InMemoryEngine ──────► 🧠 a BTreeMap
//! ```

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::criteria::{Criteria, SortOrder};
use crate::rollover::IndexStats;

pub mod elasticsearch;
pub mod in_mem;

pub use elasticsearch::{ClusterConfig, ElasticsearchClient};
pub use in_mem::InMemoryEngine;

/// 🔀 Move an alias from one index to another in a single atomic request.
///
/// `from: None` only adds. The target becomes the alias's write index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSwap {
    pub alias: String,
    pub from: Option<String>,
    pub to: String,
}

/// 🔄 Create `to` and hand it the alias's write flag in one atomic request.
///
/// Either both happen or neither does: a failed rollover leaves no orphan index behind.
/// `from` is the write index the caller saw; the engine refuses if the alias moved since.
/// The previous write index keeps the alias for reads, with the write flag cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverRequest {
    pub alias: String,
    pub from: String,
    pub to: String,
    /// 🏗️ Settings, mappings and read aliases for `to`, see `mapping::index_body`.
    pub body: Value,
}

/// 📝 One document on its way in.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    /// Index or alias. Aliases resolve to their write index.
    pub target: String,
    /// `None` lets the engine mint one.
    pub id: Option<String>,
    pub routing: Option<String>,
    pub document: Value,
    /// 🔄 Make the write visible to search before returning.
    pub refresh: bool,
}

/// ✅ Where the document landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexResponse {
    /// The physical index, never the alias.
    pub index: String,
    pub id: String,
    pub version: Option<i64>,
}

/// 🔍 A search, engine-agnostic. The Elasticsearch client renders it, the in-memory engine
/// evaluates it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchRequest {
    pub criteria: Criteria,
    pub sort: Vec<SortOrder>,
    pub limit: Option<usize>,
}

/// 🎯 One hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    pub id: String,
    pub score: Option<f64>,
    pub source: Value,
}

#[async_trait]
pub trait NetworkClient: Send + Sync + Debug {
    /// 🏗️ `body` is settings + mappings + aliases, see `mapping::index_body`.
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// 📋 Physical index names matching a wildcard pattern, sorted. No match is an empty list.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>>;

    /// 🧭 The index an alias writes into. `None` when the alias points nowhere.
    async fn write_index_for_alias(&self, alias: &str) -> Result<Option<String>>;

    async fn swap_alias(&self, swap: &AliasSwap) -> Result<()>;

    /// 🔄 See [`RolloverRequest`]. Fails without side effects when `to` already exists.
    async fn rollover(&self, request: &RolloverRequest) -> Result<()>;

    async fn index_stats(&self, index: &str) -> Result<IndexStats>;

    async fn index_document(&self, request: IndexRequest) -> Result<IndexResponse>;

    async fn search(&self, target: &str, request: &SearchRequest) -> Result<Vec<SearchHit>>;

    async fn count(&self, target: &str, criteria: &Criteria) -> Result<u64>;

    /// 🗑️ `false` when there was nothing to delete.
    async fn delete_document(&self, index: &str, id: &str, routing: Option<&str>) -> Result<bool>;
}
