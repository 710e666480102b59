//! 🦆 kdm: document mapping for Elasticsearch-style engines.
//!
//! 🧠 Knowledge graph:
//! - [`entity`] turns configured document types into immutable descriptors, built once each.
//! - [`routing`] picks the index a read or write goes to: fixed, time-bucketed, or rollover alias.
//! - [`query`] turns method names like `findByNameAndAgeOrCity` into a flat [`criteria::Criteria`] chain.
//! - [`rollover`] decides when a rollover-backed type needs a new generation and performs it,
//!   driven by the [`scheduler`].
//! - [`operations`] is the front desk that ties all of it to a [`client::NetworkClient`].

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub mod app_config;
pub mod client;
pub mod clock;
pub mod criteria;
pub mod entity;
pub mod errors;
pub mod mapper;
pub mod mapping;
pub mod operations;
pub mod placeholders;
pub mod query;
pub mod rollover;
pub mod routing;
pub mod scheduler;
pub mod units;

pub use app_config::{AppConfig, load_config};
pub use errors::{ConfigurationError, OperationError, QueryDerivationError, RolloverAttemptError};
pub use operations::{DocumentOperations, QueryResult};

use crate::client::{ElasticsearchClient, NetworkClient};
use crate::clock::SystemClock;
use crate::scheduler::TriggerScheduler;

/// 🏗️ Wire a [`DocumentOperations`] from config: registry, router, scheduler, default schedule.
///
/// 💀 Fails on the first document type whose configuration does not hold up.
pub fn build_operations(app_config: &AppConfig, client: Arc<dyn NetworkClient>) -> Result<DocumentOperations> {
    let registry = app_config.registry();
    let descriptors = registry
        .validate_all()
        .context("💀 A document type failed validation. Nothing was started.")?;
    info!("🪪 {} document type(s) validated", descriptors.len());

    let default_schedule = app_config
        .scheduler
        .default_schedule()
        .context("💀 scheduler.default_rollover_schedule is not a schedule we can read")?;

    Ok(
        DocumentOperations::new(registry, client, Arc::new(SystemClock), TriggerScheduler::current()?)
            .with_default_schedule(default_schedule),
    )
}

/// 🚀 The long-running mode: bootstrap every type, keep rollover triggers ticking until `shutdown`
/// resolves, then cancel them all.
pub async fn run(app_config: AppConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    let client = ElasticsearchClient::new(app_config.cluster.clone())
        .context("💀 Could not build the cluster client")?;
    run_with_client(&app_config, Arc::new(client), shutdown).await
}

/// 🧪 [`run`], against whatever engine you hand it.
pub async fn run_with_client(
    app_config: &AppConfig,
    client: Arc<dyn NetworkClient>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let operations = build_operations(app_config, client)?;
    let document_types: Vec<String> = operations.registry().document_types().map(str::to_string).collect();

    for document_type in &document_types {
        if let Some(created) = operations
            .bootstrap(document_type)
            .await
            .with_context(|| format!("💀 Bootstrapping '{document_type}' went sideways"))?
        {
            info!("🌱 '{}' starts life in '{}'", document_type, created);
        }
        if app_config.scheduler.enabled && operations.descriptor(document_type)?.is_rollover_backed() {
            operations.register_rollover_trigger(document_type, None)?;
        }
    }
    info!("⏰ {} trigger(s) scheduled, waiting for shutdown", operations.scheduler().active_count());

    shutdown.await;

    let stopped = operations.unregister_all();
    info!("🛑 Shutdown: cancelled {} trigger(s)", stopped);
    Ok(())
}
