//! # Previously, on KDM...
//!
//! 🎬 The cluster was down. The tests still had to run. Someone had to pretend to be a search
//! engine convincingly enough that a rollover trigger would never know the difference.
//!
//! That someone was this module.
//!
//! [`InMemoryEngine`] is a whole [`NetworkClient`] living in a `BTreeMap`: indices with creation
//! times taken from an injected [`Clock`], aliases with a write flag, auto-created indices on
//! first write, byte accounting for `max_size`, and searches answered by `Criteria::matches`.
//!
//! ⚠️ NOT for production. No analyzers, no shards, no durability. Blink and it is gone.
//!
//! 🦆

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{AliasSwap, IndexRequest, IndexResponse, NetworkClient, RolloverRequest, SearchHit, SearchRequest};
use crate::clock::{Clock, SystemClock};
use crate::criteria::eval::compare;
use crate::criteria::{Criteria, Direction, SortOrder};
use crate::rollover::IndexStats;

/// 🧠 The pretend cluster.
#[derive(Debug)]
pub struct InMemoryEngine {
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
}

#[derive(Debug, Default)]
struct EngineState {
    indices: BTreeMap<String, MemoryIndex>,
    minted_ids: u64,
}

#[derive(Debug)]
struct MemoryIndex {
    created_at: DateTime<Utc>,
    /// The create body, mappings and all. Kept so tests can look at it.
    body: Value,
    /// alias → is_write_index
    aliases: BTreeMap<String, bool>,
    documents: BTreeMap<String, StoredDocument>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    source: Value,
    version: i64,
    size_bytes: u64,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// 📋 Every physical index, sorted.
    pub async fn indices(&self) -> Vec<String> {
        self.state.lock().await.indices.keys().cloned().collect()
    }

    /// 🏷️ The aliases on `index`, sorted. Empty for unknown indices.
    pub async fn aliases_of(&self, index: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map(|found| found.aliases.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 🏗️ The body `index` was created with.
    pub async fn index_body(&self, index: &str) -> Option<Value> {
        self.state.lock().await.indices.get(index).map(|found| found.body.clone())
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .and_then(|found| found.documents.get(id))
            .map(|stored| stored.source.clone())
    }
}

impl MemoryIndex {
    fn new(created_at: DateTime<Utc>, body: Value) -> Self {
        let aliases = body
            .get("aliases")
            .and_then(Value::as_object)
            .map(|declared| {
                declared
                    .iter()
                    .map(|(alias, options)| {
                        let is_write = options
                            .get("is_write_index")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        (alias.clone(), is_write)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            created_at,
            body,
            aliases,
            documents: BTreeMap::new(),
        }
    }
}

/// `*` matches anything, everything else is literal.
fn wildcard(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$")).with_context(|| format!("💀 '{pattern}' is not a usable index pattern"))
}

impl EngineState {
    /// 🔍 Index, alias, wildcard, or a comma-separated mix. Unknown names resolve to nothing.
    fn read_targets(&self, target: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for piece in target.split(',').map(str::trim).filter(|piece| !piece.is_empty()) {
            if self.indices.contains_key(piece) {
                names.push(piece.to_string());
            } else if piece.contains('*') {
                let matcher = wildcard(piece)?;
                names.extend(self.indices.keys().filter(|name| matcher.is_match(name)).cloned());
            } else {
                names.extend(
                    self.indices
                        .iter()
                        .filter(|(_, index)| index.aliases.contains_key(piece))
                        .map(|(name, _)| name.clone()),
                );
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn write_index_for_alias(&self, alias: &str) -> Option<String> {
        let holders: Vec<(&String, bool)> = self
            .indices
            .iter()
            .filter_map(|(name, index)| index.aliases.get(alias).map(|is_write| (name, *is_write)))
            .collect();
        holders
            .iter()
            .find(|(_, is_write)| *is_write)
            .or_else(|| (holders.len() == 1).then(|| &holders[0]))
            .map(|(name, _)| (*name).clone())
    }
}

#[async_trait]
impl NetworkClient for InMemoryEngine {
    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.indices.contains_key(index) {
            bail!("💀 resource_already_exists_exception: index '{index}' already exists");
        }
        debug!("🏗️ Creating in-memory index '{}'", index);
        let created = MemoryIndex::new(self.clock.now(), body.clone());
        state.indices.insert(index.to_string(), created);
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.state.lock().await.indices.contains_key(index))
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = wildcard(pattern)?;
        let state = self.state.lock().await;
        Ok(state.indices.keys().filter(|name| matcher.is_match(name)).cloned().collect())
    }

    async fn write_index_for_alias(&self, alias: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.write_index_for_alias(alias))
    }

    async fn swap_alias(&self, swap: &AliasSwap) -> Result<()> {
        let mut state = self.state.lock().await;
        // 🔒 validate everything first so a failed swap changes nothing
        if !state.indices.contains_key(&swap.to) {
            bail!("💀 index_not_found_exception: cannot point '{}' at missing index '{}'", swap.alias, swap.to);
        }
        if let Some(from) = &swap.from {
            let holds_alias = state
                .indices
                .get(from)
                .is_some_and(|index| index.aliases.contains_key(&swap.alias));
            if !holds_alias {
                bail!("💀 aliases_not_found_exception: '{}' is not on index '{}'", swap.alias, from);
            }
        }

        if let Some(from) = &swap.from {
            if let Some(index) = state.indices.get_mut(from) {
                index.aliases.remove(&swap.alias);
            }
        }
        for index in state.indices.values_mut() {
            if let Some(is_write) = index.aliases.get_mut(&swap.alias) {
                *is_write = false;
            }
        }
        if let Some(index) = state.indices.get_mut(&swap.to) {
            index.aliases.insert(swap.alias.clone(), true);
        }
        debug!("🔀 Alias '{}' moved {:?} → '{}'", swap.alias, swap.from, swap.to);
        Ok(())
    }

    async fn rollover(&self, request: &RolloverRequest) -> Result<()> {
        let mut state = self.state.lock().await;
        // 🔒 same rule as swaps: check everything, then touch anything
        if state.indices.contains_key(&request.to) {
            bail!(
                "💀 resource_already_exists_exception: cannot roll '{}' over to existing index '{}'",
                request.alias,
                request.to
            );
        }
        match state.write_index_for_alias(&request.alias) {
            Some(current) if current == request.from => {}
            current => bail!(
                "💀 illegal_argument_exception: '{}' writes into {:?}, not '{}'",
                request.alias,
                current,
                request.from
            ),
        }

        for index in state.indices.values_mut() {
            if let Some(is_write) = index.aliases.get_mut(&request.alias) {
                *is_write = false;
            }
        }
        let mut created = MemoryIndex::new(self.clock.now(), request.body.clone());
        created.aliases.insert(request.alias.clone(), true);
        state.indices.insert(request.to.clone(), created);
        debug!("🔄 Alias '{}' rolled '{}' → '{}'", request.alias, request.from, request.to);
        Ok(())
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats> {
        let state = self.state.lock().await;
        let Some(found) = state.indices.get(index) else {
            bail!("💀 index_not_found_exception: no stats for missing index '{index}'");
        };
        let age = (self.clock.now() - found.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Ok(IndexStats {
            age,
            doc_count: found.documents.len() as u64,
            size_bytes: found.documents.values().map(|stored| stored.size_bytes).sum(),
        })
    }

    async fn index_document(&self, request: IndexRequest) -> Result<IndexResponse> {
        let mut state = self.state.lock().await;
        let index_name = if state.indices.contains_key(&request.target) {
            request.target.clone()
        } else if let Some(write_index) = state.write_index_for_alias(&request.target) {
            write_index
        } else if state.indices.values().any(|index| index.aliases.contains_key(&request.target)) {
            bail!(
                "💀 alias '{}' points at several indices and none of them is the write index",
                request.target
            );
        } else if request.target.contains('*') {
            bail!("💀 cannot write into the wildcard '{}'", request.target);
        } else {
            // 🪄 engines auto-create on first write, so do we
            trace!("🪄 Auto-creating index '{}' on first write", request.target);
            let created = MemoryIndex::new(self.clock.now(), Value::Object(Default::default()));
            state.indices.insert(request.target.clone(), created);
            request.target.clone()
        };

        let id = match request.id {
            Some(id) => id,
            None => {
                state.minted_ids += 1;
                format!("mem-{}", state.minted_ids)
            }
        };
        let size_bytes = serde_json::to_vec(&request.document)
            .context("💀 the document refused to serialize")?
            .len() as u64;
        let Some(index) = state.indices.get_mut(&index_name) else {
            bail!("💀 index '{index_name}' vanished mid-write");
        };
        let version = index.documents.get(&id).map_or(1, |previous| previous.version + 1);
        index.documents.insert(
            id.clone(),
            StoredDocument {
                source: request.document,
                version,
                size_bytes,
            },
        );
        Ok(IndexResponse {
            index: index_name,
            id,
            version: Some(version),
        })
    }

    async fn search(&self, target: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let state = self.state.lock().await;
        let mut hits: Vec<SearchHit> = Vec::new();
        for name in state.read_targets(target)? {
            let Some(index) = state.indices.get(&name) else {
                continue;
            };
            hits.extend(
                index
                    .documents
                    .iter()
                    .filter(|(_, stored)| request.criteria.matches(&stored.source))
                    .map(|(id, stored)| SearchHit {
                        index: name.clone(),
                        id: id.clone(),
                        score: Some(1.0),
                        source: stored.source.clone(),
                    }),
            );
        }
        if !request.sort.is_empty() {
            hits.sort_by(|left, right| sort_hits(&request.sort, left, right));
        }
        if let Some(limit) = request.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn count(&self, target: &str, criteria: &Criteria) -> Result<u64> {
        let state = self.state.lock().await;
        let mut total = 0u64;
        for name in state.read_targets(target)? {
            if let Some(index) = state.indices.get(&name) {
                total += index
                    .documents
                    .values()
                    .filter(|stored| criteria.matches(&stored.source))
                    .count() as u64;
            }
        }
        Ok(total)
    }

    async fn delete_document(&self, index: &str, id: &str, _routing: Option<&str>) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .indices
            .get_mut(index)
            .is_some_and(|found| found.documents.remove(id).is_some()))
    }
}

/// ⚖️ Sort keys in order. Missing values go last regardless of direction, like the engine does.
fn sort_hits(sort: &[SortOrder], left: &SearchHit, right: &SearchHit) -> Ordering {
    for order in sort {
        let a = order.field.lookup(&left.source).filter(|value| !value.is_null());
        let b = order.field.lookup(&right.source).filter(|value| !value.is_null());
        let ordering = match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let natural = compare(a, b).unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Asc => natural,
                    Direction::Desc => natural.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
