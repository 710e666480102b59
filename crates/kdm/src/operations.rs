//! 🚪 DocumentOperations: the repository-facing API.
//!
//! 🎬 *[a repository method is called. seven modules quietly get to work.]*
//!
//! ```text
//!   record ──mapper──► engine document ──router──► target name ──client──► 🌐
//!   method + args ──compiler──► CompiledQuery ──router──► read target ──client──► hits ──mapper──► records
//!   register_rollover_trigger ──► RolloverTrigger ──scheduler──► ⏰ every tick
//! ```
//!
//! The resolve/compile calls are synchronous and fail with typed [`OperationError`]s. Anything
//! that touches the network is async and returns `anyhow::Result`, with typed errors inside.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{IndexRequest, NetworkClient, SearchHit, SearchRequest};
use crate::clock::Clock;
use crate::criteria::Criteria;
use crate::entity::{AddressingMode, DescriptorRegistry, EntityDescriptor};
use crate::errors::{ConfigurationError, OperationError};
use crate::mapper::{JsonObjectMapper, ObjectMapper};
use crate::mapping::{IndexAlias, JOIN_FIELD, index_body, join_value};
use crate::query::{CompiledQuery, Parameter, SubjectKind, compile_method};
use crate::rollover::RolloverTrigger;
use crate::rollover::task::bootstrap as bootstrap_rollover;
use crate::routing::IndexRouter;
use crate::scheduler::{Schedule, TriggerScheduler};

/// 📬 What a derived query produced, by subject.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Documents(Vec<Value>),
    Count(u64),
    Exists(bool),
    Deleted(u64),
}

#[derive(Debug)]
pub struct DocumentOperations {
    registry: Arc<DescriptorRegistry>,
    router: Arc<IndexRouter>,
    client: Arc<dyn NetworkClient>,
    mapper: Arc<dyn ObjectMapper>,
    scheduler: TriggerScheduler,
    /// ⏰ For rollover types that do not declare a schedule of their own.
    default_schedule: Schedule,
}

impl DocumentOperations {
    pub fn new(
        registry: DescriptorRegistry,
        client: Arc<dyn NetworkClient>,
        clock: Arc<dyn Clock>,
        scheduler: TriggerScheduler,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            router: Arc::new(IndexRouter::new(clock)),
            client,
            mapper: Arc::new(JsonObjectMapper),
            scheduler,
            default_schedule: Schedule::MINUTELY,
        }
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn ObjectMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_default_schedule(mut self, schedule: Schedule) -> Self {
        self.default_schedule = schedule;
        self
    }

    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    pub fn router(&self) -> &IndexRouter {
        &self.router
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    pub fn descriptor(&self, document_type: &str) -> Result<Arc<EntityDescriptor>, ConfigurationError> {
        self.registry.descriptor(document_type)
    }

    // ============================================================
    // 🧭 resolve / compile
    // ============================================================

    /// 🔍 The alias or index queries for `document_type` go to.
    pub fn resolve_read_target(&self, document_type: &str) -> Result<String, OperationError> {
        let descriptor = self.descriptor(document_type)?;
        Ok(self.router.resolve_for_read(&descriptor))
    }

    /// ✍️ The alias or index `instance` (an application record) would be written to.
    pub fn resolve_write_target(&self, document_type: &str, instance: &Value) -> Result<String, OperationError> {
        let descriptor = self.descriptor(document_type)?;
        let document = self.engine_document(&descriptor, instance)?;
        Ok(self.router.resolve_for_write(&descriptor, Some(&document)))
    }

    pub fn compile_query(
        &self,
        document_type: &str,
        method: &str,
        arguments: &[Parameter],
    ) -> Result<CompiledQuery, OperationError> {
        let descriptor = self.descriptor(document_type)?;
        Ok(compile_method(method, descriptor.as_ref(), arguments)?)
    }

    // ============================================================
    // ⏰ triggers
    // ============================================================

    /// 🔁 Schedule rollover checks for `document_type`, replacing any running ones.
    ///
    /// Schedule precedence: the argument, then the type's configured schedule, then the default.
    pub fn register_rollover_trigger(
        &self,
        document_type: &str,
        schedule: Option<Schedule>,
    ) -> Result<Arc<RolloverTrigger>, OperationError> {
        let descriptor = self.descriptor(document_type)?;
        if !descriptor.is_rollover_backed() {
            return Err(ConfigurationError::NotRolloverBacked {
                document_type: document_type.to_string(),
            }
            .into());
        }
        let schedule = schedule
            .or_else(|| descriptor.rollover_schedule().cloned())
            .unwrap_or_else(|| self.default_schedule.clone());
        let trigger = Arc::new(RolloverTrigger::new(
            descriptor,
            self.client.clone(),
            self.router.clone(),
            schedule,
        ));
        self.scheduler.start(trigger.clone());
        Ok(trigger)
    }

    /// 🛑 Cancel every scheduled trigger. Safe to call any number of times.
    pub fn unregister_all(&self) -> usize {
        self.scheduler.stop_all()
    }

    // ============================================================
    // 📡 engine round trips
    // ============================================================

    /// 🌱 Get `document_type`'s physical side ready: the first rollover generation, or the fixed
    /// index. Time-based buckets are created by the engine on first write.
    pub async fn bootstrap(&self, document_type: &str) -> Result<Option<String>> {
        let descriptor = self.descriptor(document_type)?;
        match descriptor.mode() {
            AddressingMode::RolloverBacked { .. } => {
                Ok(bootstrap_rollover(self.client.as_ref(), &self.router, &descriptor).await?)
            }
            AddressingMode::Fixed { index } => {
                if self.client.index_exists(index).await? {
                    return Ok(None);
                }
                let aliases: Vec<IndexAlias> = descriptor.alias().map(IndexAlias::read).into_iter().collect();
                self.client
                    .create_index(index, &index_body(&descriptor, &aliases))
                    .await
                    .with_context(|| format!("💀 Could not create index '{index}' for '{document_type}'"))?;
                info!("🌱 Created index '{}' for '{}'", index, document_type);
                Ok(Some(index.clone()))
            }
            AddressingMode::TimeBased { .. } => Ok(None),
        }
    }

    /// 💾 Write `instance` and hand it back with identity, version and index name filled in.
    pub async fn save(&self, document_type: &str, instance: &Value) -> Result<Value> {
        let descriptor = self.descriptor(document_type)?;
        let mut document = self.engine_document(&descriptor, instance)?;

        let routing = descriptor.routing_of(&document);
        let parent = routing.clone().or_else(|| descriptor.parent_id_of(&document));
        if let Some(join) = join_value(&descriptor, parent.as_deref()) {
            if let Value::Object(fields) = &mut document {
                fields.insert(JOIN_FIELD.to_string(), join);
            }
        }
        let target = self.router.resolve_for_write(&descriptor, Some(&document));
        let response = self
            .client
            .index_document(IndexRequest {
                target: target.clone(),
                id: descriptor.identity_of(&document),
                routing,
                document: document.clone(),
                refresh: true,
            })
            .await
            .with_context(|| format!("💀 Saving a '{document_type}' into '{target}' did not work out"))?;
        debug!("💾 Saved '{}' {} into '{}'", document_type, response.id, response.index);

        descriptor.set_identity(&mut document, &response.id);
        if let Some(version) = response.version {
            descriptor.set_version(&mut document, version);
        }
        descriptor.set_index_name(&mut document, &response.index);
        self.record(&descriptor, document)
    }

    /// 🔍 Low-level search: records with identity, score and index name populated.
    pub async fn search(&self, document_type: &str, request: &SearchRequest) -> Result<Vec<Value>> {
        let descriptor = self.descriptor(document_type)?;
        let target = self.router.resolve_for_read(&descriptor);
        let hits = self
            .client
            .search(&target, request)
            .await
            .with_context(|| format!("💀 Searching '{target}' for '{document_type}' failed"))?;
        hits.into_iter().map(|hit| self.hit_record(&descriptor, hit)).collect()
    }

    pub async fn count(&self, document_type: &str, criteria: &Criteria) -> Result<u64> {
        let descriptor = self.descriptor(document_type)?;
        let target = self.router.resolve_for_read(&descriptor);
        self.client
            .count(&target, criteria)
            .await
            .with_context(|| format!("💀 Counting '{document_type}' in '{target}' failed"))
    }

    /// 🚀 Compile a derived query and run it according to its subject.
    pub async fn execute(&self, document_type: &str, method: &str, arguments: &[Parameter]) -> Result<QueryResult> {
        let compiled = self.compile_query(document_type, method, arguments)?;
        match compiled.subject {
            SubjectKind::Find => {
                let request = SearchRequest {
                    criteria: compiled.criteria,
                    sort: compiled.sort,
                    limit: compiled.limit,
                };
                Ok(QueryResult::Documents(self.search(document_type, &request).await?))
            }
            SubjectKind::Count => Ok(QueryResult::Count(self.count(document_type, &compiled.criteria).await?)),
            SubjectKind::Exists => Ok(QueryResult::Exists(
                self.count(document_type, &compiled.criteria).await? > 0,
            )),
            SubjectKind::Delete => {
                let descriptor = self.descriptor(document_type)?;
                let target = self.router.resolve_for_read(&descriptor);
                let request = SearchRequest {
                    criteria: compiled.criteria,
                    sort: compiled.sort,
                    limit: compiled.limit,
                };
                let mut deleted = 0;
                for hit in self.client.search(&target, &request).await? {
                    let routing = descriptor.routing_of(&hit.source);
                    if self.client.delete_document(&hit.index, &hit.id, routing.as_deref()).await? {
                        deleted += 1;
                    }
                }
                info!("🗑️ Deleted {} '{}' documents via {}", deleted, document_type, method);
                Ok(QueryResult::Deleted(deleted))
            }
        }
    }

    fn engine_document(&self, descriptor: &EntityDescriptor, instance: &Value) -> Result<Value, OperationError> {
        self.mapper
            .to_engine(descriptor, instance)
            .map_err(|err| OperationError::Mapping {
                document_type: descriptor.document_type().to_string(),
                reason: format!("{err:#}"),
            })
    }

    fn hit_record(&self, descriptor: &EntityDescriptor, hit: SearchHit) -> Result<Value> {
        let mut document = hit.source;
        descriptor.set_identity(&mut document, &hit.id);
        if let Some(score) = hit.score {
            descriptor.set_score(&mut document, score);
        }
        descriptor.set_index_name(&mut document, &hit.index);
        self.record(descriptor, document)
    }

    /// ⬅️ Engine document → record, minus the join bookkeeping.
    fn record(&self, descriptor: &EntityDescriptor, mut document: Value) -> Result<Value> {
        if let Value::Object(fields) = &mut document {
            fields.remove(JOIN_FIELD);
        }
        self.mapper.from_engine(descriptor, &document)
    }
}
