//! 🗄️ DescriptorRegistry: raw configs in, cached descriptors out.
//!
//! Descriptors are built lazily, at most once per document type, and shared as `Arc`s for
//! the rest of the process. When several threads ask for the same type at the same time,
//! one builds and the rest wait on the same cell. A failed build leaves the cell empty so
//! the error is reported again on the next ask instead of being frozen.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::info;

use super::{DocumentTypeConfig, EntityDescriptor};
use crate::errors::ConfigurationError;
use crate::placeholders::EnvironmentResolver;

#[derive(Debug)]
pub struct DescriptorRegistry {
    configs: BTreeMap<String, DocumentTypeConfig>,
    cells: DashMap<String, Arc<OnceCell<Arc<EntityDescriptor>>>>,
    resolver: Arc<dyn EnvironmentResolver>,
}

impl DescriptorRegistry {
    pub fn new(resolver: Arc<dyn EnvironmentResolver>) -> Self {
        Self {
            configs: BTreeMap::new(),
            cells: DashMap::new(),
            resolver,
        }
    }

    /// 📝 Register a raw config. Re-registering a name replaces the config and forgets
    /// any descriptor already built from the old one.
    pub fn register(&mut self, config: DocumentTypeConfig) -> &mut Self {
        self.cells.remove(&config.name);
        self.configs.insert(config.name.clone(), config);
        self
    }

    pub fn with(mut self, config: DocumentTypeConfig) -> Self {
        self.register(config);
        self
    }

    pub fn from_configs(
        resolver: Arc<dyn EnvironmentResolver>,
        configs: impl IntoIterator<Item = DocumentTypeConfig>,
    ) -> Self {
        configs
            .into_iter()
            .fold(Self::new(resolver), |registry, config| registry.with(config))
    }

    pub fn document_types(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn config(&self, document_type: &str) -> Option<&DocumentTypeConfig> {
        self.configs.get(document_type)
    }

    pub fn resolver(&self) -> &Arc<dyn EnvironmentResolver> {
        &self.resolver
    }

    /// 🪪 The descriptor for `document_type`, built on first use.
    pub fn descriptor(&self, document_type: &str) -> Result<Arc<EntityDescriptor>, ConfigurationError> {
        let config = self
            .configs
            .get(document_type)
            .ok_or_else(|| ConfigurationError::UnknownDocumentType {
                document_type: document_type.to_string(),
            })?;

        // 🔒 clone the cell out so the map shard lock is released before anything is built
        let cell = self
            .cells
            .entry(document_type.to_string())
            .or_default()
            .value()
            .clone();

        cell.get_or_try_init(|| {
            let descriptor = EntityDescriptor::build(config, self.resolver.as_ref())?;
            info!(
                "🪪 Registered document type '{}' ({} addressing)",
                descriptor.document_type(),
                descriptor.mode().name()
            );
            Ok(Arc::new(descriptor))
        })
        .cloned()
    }

    /// ✅ Build everything now. Startup calls this so bad configs fail before traffic does.
    pub fn validate_all(&self) -> Result<Vec<Arc<EntityDescriptor>>, ConfigurationError> {
        self.configs
            .keys()
            .map(|document_type| self.descriptor(document_type))
            .collect()
    }
}
