//! 🔁 The rollover job body, and the trigger that runs it on a schedule.
//!
//! One tick, start to finish:
//!
//! ```text
//!   write alias ──► current write index ──► stats ──► evaluate()
//!                                                       │ no  → NotNeeded
//!                                                       │ yes
//!                                                       ▼
//!   list {prefix}-* ──► next name (collision = stop) ──► rollover (create + repoint, atomic) ──► RolledOver
//! ```
//!
//! Every failure ends the tick as [`RolloverOutcome::Failed`] with a log line. Nothing is retried
//! until the next scheduled tick, which starts over from the alias lookup. The create and the
//! alias move are one engine request, so a failed tick leaves no half-made generation behind
//! for the next one to collide with.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{IndexStats, RolloverDecision, evaluate};
use crate::client::{AliasSwap, NetworkClient, RolloverRequest};
use crate::entity::{AddressingMode, EntityDescriptor, RolloverAlias};
use crate::errors::{ConfigurationError, RolloverAttemptError};
use crate::mapping::{IndexAlias, index_body};
use crate::routing::IndexRouter;
use crate::scheduler::{Schedule, Trigger, TriggerKind};

/// 📜 How a tick ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RolloverOutcome {
    /// Thresholds not reached. `index` keeps the write alias.
    NotNeeded { index: String, stats: IndexStats },
    RolledOver {
        from: String,
        to: String,
        decision: RolloverDecision,
    },
    /// 💀 Logged already. The next tick tries again from scratch.
    Failed { reason: String },
}

fn rollover_alias(descriptor: &EntityDescriptor) -> Result<&RolloverAlias, ConfigurationError> {
    match descriptor.mode() {
        AddressingMode::RolloverBacked { alias, .. } => Ok(alias),
        _ => Err(ConfigurationError::NotRolloverBacked {
            document_type: descriptor.document_type().to_string(),
        }),
    }
}

/// 🏷️ Read aliases every generation carries: the rollover read alias and the type's alias.
fn read_aliases(descriptor: &EntityDescriptor, alias: &RolloverAlias) -> Vec<IndexAlias> {
    let mut names: Vec<&str> = alias.read_alias.as_deref().into_iter().chain(descriptor.alias()).collect();
    names.dedup();
    names
        .into_iter()
        .filter(|name| *name != alias.write_alias)
        .map(IndexAlias::read)
        .collect()
}

/// 🌱 Make sure the write alias points somewhere.
///
/// Creates `{prefix}-000001` holding the write alias (as write index) and the read aliases, unless
/// the alias already resolves. Returns the index it created, if it created one.
pub async fn bootstrap(
    client: &dyn NetworkClient,
    router: &IndexRouter,
    descriptor: &EntityDescriptor,
) -> Result<Option<String>, RolloverAttemptError> {
    let alias = rollover_alias(descriptor)?;
    if let Some(existing) = client.write_index_for_alias(&alias.write_alias).await? {
        debug!(
            "🌱 '{}' already writes into '{}', nothing to bootstrap",
            alias.write_alias, existing
        );
        return Ok(None);
    }

    let first = router
        .initial_rollover_index(descriptor)
        .ok_or_else(|| ConfigurationError::NotRolloverBacked {
            document_type: descriptor.document_type().to_string(),
        })?;
    if client.index_exists(&first).await? {
        // 🩹 the index survived but lost its alias: hand the alias back instead of recreating
        client
            .swap_alias(&AliasSwap {
                alias: alias.write_alias.clone(),
                from: None,
                to: first.clone(),
            })
            .await?;
        warn!(
            "🩹 '{}' existed without write alias '{}'; re-attached it",
            first, alias.write_alias
        );
        return Ok(None);
    }

    let mut aliases = vec![IndexAlias::write(alias.write_alias.clone())];
    aliases.extend(read_aliases(descriptor, alias));
    client.create_index(&first, &index_body(descriptor, &aliases)).await?;
    info!(
        "🌱 Bootstrapped '{}': created '{}' behind write alias '{}'",
        descriptor.document_type(),
        first,
        alias.write_alias
    );
    Ok(Some(first))
}

/// 🔁 One rollover attempt. Errors are returned, not logged; [`RolloverTrigger`] does the logging.
pub async fn tick(
    client: &dyn NetworkClient,
    router: &IndexRouter,
    descriptor: &EntityDescriptor,
) -> Result<RolloverOutcome, RolloverAttemptError> {
    let alias = rollover_alias(descriptor)?;
    let current = client
        .write_index_for_alias(&alias.write_alias)
        .await?
        .ok_or_else(|| RolloverAttemptError::NoWriteIndex {
            document_type: descriptor.document_type().to_string(),
            alias: alias.write_alias.clone(),
        })?;

    let stats = client.index_stats(&current).await?;
    let decision = evaluate(descriptor, &stats)?;
    debug!(
        "🔍 '{}' write index '{}': {} docs, {} bytes, age {:?} → roll: {}",
        descriptor.document_type(),
        current,
        stats.doc_count,
        stats.size_bytes,
        stats.age,
        decision.should
    );
    if !decision.should {
        return Ok(RolloverOutcome::NotNeeded { index: current, stats });
    }

    let existing = client.list_indices(&format!("{}-*", alias.index_prefix)).await?;
    let next = router.resolve_rollover_target(descriptor, &current, &existing)?;

    client
        .rollover(&RolloverRequest {
            alias: alias.write_alias.clone(),
            from: current.clone(),
            to: next.clone(),
            body: index_body(descriptor, &read_aliases(descriptor, alias)),
        })
        .await?;

    let reasons: Vec<String> = decision.conditions_met.iter().map(ToString::to_string).collect();
    info!(
        "🔄 Rolled '{}' over: '{}' → '{}' ({})",
        descriptor.document_type(),
        current,
        next,
        reasons.join(", ")
    );
    Ok(RolloverOutcome::RolledOver {
        from: current,
        to: next,
        decision,
    })
}

/// ⏰ The scheduled face of [`tick`].
#[derive(Debug)]
pub struct RolloverTrigger {
    descriptor: Arc<EntityDescriptor>,
    client: Arc<dyn NetworkClient>,
    router: Arc<IndexRouter>,
    schedule: Schedule,
    last_outcome: Mutex<Option<RolloverOutcome>>,
}

impl RolloverTrigger {
    pub fn new(
        descriptor: Arc<EntityDescriptor>,
        client: Arc<dyn NetworkClient>,
        router: Arc<IndexRouter>,
        schedule: Schedule,
    ) -> Self {
        Self {
            descriptor,
            client,
            router,
            schedule,
            last_outcome: Mutex::new(None),
        }
    }

    /// 📜 What the most recent tick did. `None` before the first one.
    pub fn last_outcome(&self) -> Option<RolloverOutcome> {
        self.last_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 🔂 Tick once, log the result, remember it, never fail.
    pub async fn run_once(&self) -> RolloverOutcome {
        let document_type = self.descriptor.document_type();
        let outcome = match tick(self.client.as_ref(), &self.router, &self.descriptor).await {
            Ok(outcome) => outcome,
            Err(err @ RolloverAttemptError::Collision(_)) => {
                error!("💀 Rollover of '{}' stopped: {}", document_type, err);
                RolloverOutcome::Failed {
                    reason: err.to_string(),
                }
            }
            Err(err) => {
                warn!(
                    "⚠️ Rollover attempt for '{}' failed, next tick will retry: {:#}",
                    document_type, err
                );
                RolloverOutcome::Failed {
                    reason: format!("{err:#}"),
                }
            }
        };
        *self
            .last_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome.clone());
        outcome
    }
}

#[async_trait]
impl Trigger for RolloverTrigger {
    fn document_type(&self) -> &str {
        self.descriptor.document_type()
    }

    fn kind(&self) -> TriggerKind {
        TriggerKind::ROLLOVER
    }

    fn schedule(&self) -> Schedule {
        self.schedule.clone()
    }

    async fn fire(&self) {
        self.run_once().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{IndexRequest, IndexResponse, InMemoryEngine, SearchHit, SearchRequest};
    use crate::criteria::Criteria;
    use crate::clock::FixedClock;
    use crate::entity::{DocumentTypeConfig, RolloverConfig};
    use crate::errors::NamingCollisionError;
    use crate::placeholders::MapEnvironment;
    use crate::rollover::RolloverCondition;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Rig {
        clock: Arc<FixedClock>,
        engine: Arc<InMemoryEngine>,
        router: Arc<IndexRouter>,
    }

    fn rig() -> Rig {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).single().expect("valid date");
        let clock = Arc::new(FixedClock::new(start));
        Rig {
            engine: Arc::new(InMemoryEngine::new(clock.clone())),
            router: Arc::new(IndexRouter::new(clock.clone())),
            clock,
        }
    }

    fn logs(rollover: RolloverConfig) -> Arc<EntityDescriptor> {
        let config = DocumentTypeConfig::new("LogLine").rollover(rollover);
        Arc::new(EntityDescriptor::build(&config, &MapEnvironment::default()).expect("log line should build"))
    }

    async fn write(engine: &InMemoryEngine, alias: &str, n: u64) {
        engine
            .index_document(IndexRequest {
                target: alias.into(),
                id: Some(format!("line-{n}")),
                routing: None,
                document: json!({"n": n}),
                refresh: true,
            })
            .await
            .expect("write through alias");
    }

    #[tokio::test]
    async fn the_one_where_three_docs_over_a_limit_of_two_roll_to_a_new_name() {
        let rig = rig();
        let descriptor = logs(RolloverConfig::new("logs-write").read_alias("logs").max_docs(2));

        let first = bootstrap(rig.engine.as_ref(), &rig.router, &descriptor)
            .await
            .expect("bootstrap");
        assert_eq!(first.as_deref(), Some("logs-write-000001"));
        for n in 0..3 {
            write(&rig.engine, "logs-write", n).await;
        }

        let stats = rig.engine.index_stats("logs-write-000001").await.expect("stats");
        assert!(evaluate(&descriptor, &stats).expect("rollover backed").should);

        let outcome = tick(rig.engine.as_ref(), &rig.router, &descriptor).await.expect("tick");
        let (from, to, decision) = match outcome {
            RolloverOutcome::RolledOver { from, to, decision } => (from, to, decision),
            other => panic!("expected a rollover, got {other:?}"),
        };
        assert_ne!(from, to);
        assert_eq!(to, "logs-write-000002");
        assert_eq!(decision.conditions_met, vec![RolloverCondition::MaxDocs(2)]);
        assert_eq!(
            rig.engine.write_index_for_alias("logs-write").await.expect("lookup"),
            Some(to.clone())
        );
        // 🔍 the old generation is still readable, and no longer written to
        assert_eq!(
            rig.engine.aliases_of("logs-write-000001").await,
            vec!["logs".to_string(), "logs-write".to_string()]
        );
        assert_eq!(rig.engine.aliases_of(&to).await, vec!["logs".to_string(), "logs-write".to_string()]);
    }

    #[tokio::test]
    async fn the_one_where_a_young_small_index_stays_put() {
        let rig = rig();
        let descriptor = logs(RolloverConfig::new("logs-write").max_docs(100).max_age("1d"));
        bootstrap(rig.engine.as_ref(), &rig.router, &descriptor).await.expect("bootstrap");
        write(&rig.engine, "logs-write", 1).await;

        let outcome = tick(rig.engine.as_ref(), &rig.router, &descriptor).await.expect("tick");
        assert!(matches!(outcome, RolloverOutcome::NotNeeded { ref index, .. } if index == "logs-write-000001"));

        // ⏩ a day later, age alone is enough
        rig.clock.advance(chrono::Duration::days(1));
        let outcome = tick(rig.engine.as_ref(), &rig.router, &descriptor).await.expect("tick");
        match outcome {
            RolloverOutcome::RolledOver { decision, .. } => assert_eq!(
                decision.conditions_met,
                vec![RolloverCondition::MaxAge(Duration::from_secs(86_400))]
            ),
            other => panic!("expected a rollover, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_the_next_name_is_taken_and_nobody_improvises() {
        let rig = rig();
        let descriptor = logs(RolloverConfig::new("logs-write").max_docs(1));
        bootstrap(rig.engine.as_ref(), &rig.router, &descriptor).await.expect("bootstrap");
        write(&rig.engine, "logs-write", 1).await;
        rig.engine
            .create_index("logs-write-000002", &json!({}))
            .await
            .expect("squatter");

        let err = tick(rig.engine.as_ref(), &rig.router, &descriptor)
            .await
            .expect_err("collision");
        assert!(matches!(
            err,
            RolloverAttemptError::Collision(NamingCollisionError { ref index, .. }) if index == "logs-write-000002"
        ));
        assert_eq!(
            rig.engine.write_index_for_alias("logs-write").await.expect("lookup"),
            Some("logs-write-000001".to_string())
        );
    }

    #[tokio::test]
    async fn the_one_where_the_trigger_swallows_failures_and_remembers_them() {
        let rig = rig();
        let descriptor = logs(RolloverConfig::new("logs-write").max_docs(1));
        let trigger = RolloverTrigger::new(
            descriptor.clone(),
            rig.engine.clone(),
            rig.router.clone(),
            Schedule::every(Duration::from_secs(60)).expect("a minute is not zero"),
        );
        assert_eq!(trigger.last_outcome(), None);

        // 🕳️ never bootstrapped: no write index
        trigger.fire().await;
        match trigger.last_outcome() {
            Some(RolloverOutcome::Failed { reason }) => assert!(reason.contains("logs-write"), "{reason}"),
            other => panic!("expected a failure, got {other:?}"),
        }

        bootstrap(rig.engine.as_ref(), &rig.router, &descriptor).await.expect("bootstrap");
        assert_eq!(
            bootstrap(rig.engine.as_ref(), &rig.router, &descriptor).await.expect("second bootstrap"),
            None
        );
        write(&rig.engine, "logs-write", 1).await;
        trigger.fire().await;
        assert!(matches!(trigger.last_outcome(), Some(RolloverOutcome::RolledOver { .. })));
        assert_eq!(trigger.kind(), TriggerKind::ROLLOVER);
        assert_eq!(trigger.key().to_string(), "LogLine/rollover");
    }

    /// 🌩️ An in-memory engine that fails the next N calls of chosen operations, then recovers.
    #[derive(Debug)]
    struct FlakyEngine {
        inner: Arc<InMemoryEngine>,
        stats_failures: AtomicU32,
        rollover_failures: AtomicU32,
    }

    impl FlakyEngine {
        fn new(inner: Arc<InMemoryEngine>) -> Self {
            Self {
                inner,
                stats_failures: AtomicU32::new(0),
                rollover_failures: AtomicU32::new(0),
            }
        }

        fn trip(counter: &AtomicU32, what: &str) -> anyhow::Result<()> {
            if counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("💀 503 service_unavailable during {what}");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl NetworkClient for FlakyEngine {
        async fn create_index(&self, index: &str, body: &serde_json::Value) -> anyhow::Result<()> {
            self.inner.create_index(index, body).await
        }

        async fn index_exists(&self, index: &str) -> anyhow::Result<bool> {
            self.inner.index_exists(index).await
        }

        async fn list_indices(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
            self.inner.list_indices(pattern).await
        }

        async fn write_index_for_alias(&self, alias: &str) -> anyhow::Result<Option<String>> {
            self.inner.write_index_for_alias(alias).await
        }

        async fn swap_alias(&self, swap: &AliasSwap) -> anyhow::Result<()> {
            self.inner.swap_alias(swap).await
        }

        async fn rollover(&self, request: &RolloverRequest) -> anyhow::Result<()> {
            Self::trip(&self.rollover_failures, "rollover")?;
            self.inner.rollover(request).await
        }

        async fn index_stats(&self, index: &str) -> anyhow::Result<IndexStats> {
            Self::trip(&self.stats_failures, "stats")?;
            self.inner.index_stats(index).await
        }

        async fn index_document(&self, request: IndexRequest) -> anyhow::Result<IndexResponse> {
            self.inner.index_document(request).await
        }

        async fn search(&self, target: &str, request: &SearchRequest) -> anyhow::Result<Vec<SearchHit>> {
            self.inner.search(target, request).await
        }

        async fn count(&self, target: &str, criteria: &Criteria) -> anyhow::Result<u64> {
            self.inner.count(target, criteria).await
        }

        async fn delete_document(&self, index: &str, id: &str, routing: Option<&str>) -> anyhow::Result<bool> {
            self.inner.delete_document(index, id, routing).await
        }
    }

    #[tokio::test]
    async fn the_one_where_a_failed_rollover_leaves_nothing_for_the_next_tick_to_trip_on() {
        let rig = rig();
        let descriptor = logs(RolloverConfig::new("w").max_docs(1));
        let flaky = Arc::new(FlakyEngine::new(rig.engine.clone()));
        bootstrap(flaky.as_ref(), &rig.router, &descriptor).await.expect("bootstrap");
        write(&rig.engine, "w", 1).await;
        let trigger = RolloverTrigger::new(
            descriptor.clone(),
            flaky.clone(),
            rig.router.clone(),
            Schedule::every(Duration::from_secs(60)).expect("a minute is not zero"),
        );

        flaky.rollover_failures.store(1, Ordering::SeqCst);
        match trigger.run_once().await {
            RolloverOutcome::Failed { reason } => assert!(reason.contains("503"), "{reason}"),
            other => panic!("expected the first tick to fail, got {other:?}"),
        }
        assert_eq!(rig.engine.indices().await, vec!["w-000001".to_string()]);
        assert_eq!(
            rig.engine.write_index_for_alias("w").await.expect("lookup"),
            Some("w-000001".to_string())
        );

        // 🔁 next tick starts from scratch and gets there
        match trigger.run_once().await {
            RolloverOutcome::RolledOver { from, to, .. } => {
                assert_eq!(from, "w-000001");
                assert_eq!(to, "w-000002");
            }
            other => panic!("expected the retry to roll over, got {other:?}"),
        }
        assert_eq!(
            rig.engine.write_index_for_alias("w").await.expect("lookup"),
            Some("w-000002".to_string())
        );
    }

    #[tokio::test]
    async fn the_one_where_stats_go_missing_for_a_tick_and_come_back() {
        let rig = rig();
        let descriptor = logs(RolloverConfig::new("w").max_docs(1));
        let flaky = Arc::new(FlakyEngine::new(rig.engine.clone()));
        bootstrap(flaky.as_ref(), &rig.router, &descriptor).await.expect("bootstrap");
        write(&rig.engine, "w", 1).await;

        flaky.stats_failures.store(2, Ordering::SeqCst);
        for _ in 0..2 {
            let err = tick(flaky.as_ref(), &rig.router, &descriptor)
                .await
                .expect_err("stats unavailable");
            assert!(matches!(err, RolloverAttemptError::Engine(_)), "{err:?}");
        }
        assert_eq!(rig.engine.indices().await, vec!["w-000001".to_string()]);

        let outcome = tick(flaky.as_ref(), &rig.router, &descriptor).await.expect("third tick");
        assert!(matches!(outcome, RolloverOutcome::RolledOver { ref to, .. } if to == "w-000002"));
    }
}
