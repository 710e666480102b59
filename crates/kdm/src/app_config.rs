//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment. `KDM_*` environment variables are the base layer, an optional TOML
//! file goes on top and wins on conflicts. Nested keys use a double underscore:
//! `KDM_CLUSTER__URL=http://es:9200`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::client::ClusterConfig;
use crate::entity::{DescriptorRegistry, DocumentTypeConfig};
use crate::errors::ConfigurationError;
use crate::placeholders::{ChainedEnvironment, MapEnvironment, ProcessEnvironment};
use crate::scheduler::Schedule;

/// 📦 One struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    /// 🌐 Where the engine lives.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// 🗝️ Values for `${...}` placeholders. Checked before process environment variables.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 📋 One `[[document_types]]` table per type.
    #[serde(default)]
    pub document_types: Vec<DocumentTypeConfig>,
}

/// ⏰ Trigger scheduler knobs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// 🛑 `false` keeps every rollover trigger from being registered at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// For rollover types without a `schedule` of their own.
    #[serde(default = "default_rollover_schedule")]
    pub default_rollover_schedule: String,
}

fn default_enabled() -> bool {
    true
}

fn default_rollover_schedule() -> String {
    "@every 1m".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_rollover_schedule: default_rollover_schedule(),
        }
    }
}

impl SchedulerConfig {
    pub fn default_schedule(&self) -> Result<Schedule, ConfigurationError> {
        self.default_rollover_schedule.parse()
    }
}

impl AppConfig {
    /// 🗝️ The stock placeholder resolver: `properties` first, then process environment variables.
    pub fn environment(&self) -> ChainedEnvironment {
        ChainedEnvironment::new()
            .then(MapEnvironment::new(self.properties.clone()))
            .then(ProcessEnvironment)
    }

    /// 🪪 A registry holding every configured document type, nothing built yet.
    pub fn registry(&self) -> DescriptorRegistry {
        DescriptorRegistry::from_configs(Arc::new(self.environment()), self.document_types.iter().cloned())
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 📐 `None` means env vars only. `Some(path)` means env vars + TOML, TOML wins.
/// 💀 Unparseable config is an error whose context names where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("KDM_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (KDM_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (KDM_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
