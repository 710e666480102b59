//! 🚀 kdm-cli: the front door to kdm.
//!
//! 🎬 *[narrator voice]* "It all started with a TOML file and a question: where does this document go?"
//! 📦 Thin wrapper: loads config, sets up logging, and hands the real work to the library.
//! Like a manager. 🦆

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use kdm::AppConfig;
use kdm::client::ElasticsearchClient;
use kdm::clock::SystemClock;
use kdm::criteria::render::render_search_body;
use kdm::query::{Parameter, compile_method};
use kdm::rollover::RolloverOutcome;
use kdm::routing::IndexRouter;
use serde_json::Value;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kdm", about = "🦆 Index routing, derived queries and rollover for document types")]
struct Cli {
    /// 📋 Config file. Missing is fine, `KDM_*` environment variables still apply.
    #[arg(short, long, default_value = "kdm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 🧭 Where every document type reads from and writes to, right now.
    Routes,
    /// 🔍 Compile a derived-query method name and print the search body it becomes.
    Compile {
        document_type: String,
        /// e.g. `findByQuestionIdAndScoreGreaterThanOrderByScoreDesc`
        method: String,
        /// 🎯 One argument per placeholder, in method order. Each is read as JSON, and taken as a
        /// plain string when it isn't (`q-1` works as well as `"q-1"`).
        arguments: Vec<String>,
    },
    /// 🔄 Bootstrap every type and keep rollover triggers running until Ctrl-C.
    Rollover {
        /// 🔂 Check every rollover type once, print what happened, exit.
        #[arg(long)]
        once: bool,
    },
}

/// 🚀 main(): init tracing, parse args, load config, run the thing, cry if needed.
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 🔒 Validate the config file exists before we get too emotionally attached
    let config_file = cli
        .config
        .try_exists()
        .with_context(|| {
            format!(
                "💀 Couldn't tell whether the configuration file exists. If this is a relative path, \
                 try an absolute one. Was checking here: '{}'",
                cli.config.display()
            )
        })?
        .then_some(cli.config.as_path());

    let app_config = kdm::load_config(config_file)
        .context("💀 In kdm-cli, main, we couldn't load the config. Take a look at the file and the KDM_* variables.")?;

    let cluster_url = app_config.cluster.url.clone();
    let result = match cli.command {
        Command::Routes => routes(&app_config),
        Command::Compile {
            document_type,
            method,
            arguments,
        } => compile(&app_config, &document_type, &method, &arguments),
        Command::Rollover { once: true } => rollover_once(&app_config).await,
        Command::Rollover { once: false } => {
            kdm::run(app_config, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!("💀 Could not listen for Ctrl-C, shutting down now: {}", err);
                }
            })
            .await
        }
    };

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("onnection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: the cluster at '{}' isn't reachable. Is it running? \
                 `docker ps` knows. ☕",
                cluster_url
            );
        }
        std::process::exit(1);
    }

    Ok(())
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// 🧭 One row per type: mode, read target, write target (for a document without a time field).
fn routes(app_config: &AppConfig) -> Result<()> {
    let registry = app_config.registry();
    let router = IndexRouter::new(Arc::new(SystemClock));
    let mut table = table(vec!["Document type", "Mode", "Read target", "Write target"]);
    for descriptor in registry.validate_all()? {
        table.add_row(vec![
            Cell::new(descriptor.document_type()),
            Cell::new(descriptor.mode().name()),
            Cell::new(router.resolve_for_read(&descriptor)),
            Cell::new(router.resolve_for_write(&descriptor, None)),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn compile(app_config: &AppConfig, document_type: &str, method: &str, arguments: &[String]) -> Result<()> {
    let descriptor = app_config.registry().descriptor(document_type)?;
    let arguments: Vec<Parameter> = arguments
        .iter()
        .map(|raw| {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            Parameter::from_json(value)
        })
        .collect();

    let compiled = compile_method(method, descriptor.as_ref(), &arguments)?;
    println!("🔍 {} {}: {}", compiled.subject.as_str(), document_type, compiled.criteria);
    println!(
        "{}",
        serde_json::to_string_pretty(&render_search_body(&compiled.criteria, &compiled.sort, compiled.limit))?
    );
    Ok(())
}

async fn rollover_once(app_config: &AppConfig) -> Result<()> {
    let client = Arc::new(ElasticsearchClient::new(app_config.cluster.clone())?);
    client.ping().await?;
    let operations = kdm::build_operations(app_config, client)?;

    let document_types: Vec<String> = operations.registry().document_types().map(str::to_string).collect();
    let mut table = table(vec!["Document type", "Outcome", "Detail"]);
    for document_type in &document_types {
        if !operations.descriptor(document_type)?.is_rollover_backed() {
            continue;
        }
        operations.bootstrap(document_type).await?;
        let trigger = operations.register_rollover_trigger(document_type, None)?;
        let (outcome, detail) = match trigger.run_once().await {
            RolloverOutcome::NotNeeded { index, stats } => (
                "not needed",
                format!("{index}: {} docs, {} bytes", stats.doc_count, stats.size_bytes),
            ),
            RolloverOutcome::RolledOver { from, to, decision } => {
                let met: Vec<String> = decision.conditions_met.iter().map(ToString::to_string).collect();
                ("rolled over", format!("{from} → {to} ({})", met.join(", ")))
            }
            RolloverOutcome::Failed { reason } => ("failed", reason),
        };
        table.add_row(vec![Cell::new(document_type), Cell::new(outcome), Cell::new(detail)]);
    }
    operations.unregister_all();
    println!("{table}");
    Ok(())
}
