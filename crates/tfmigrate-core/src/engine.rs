//! Migration engine: the entry point tying a registry to the pipelines.

use crate::context::MigrationContext;
use crate::error::{ErrorList, DEFAULT_ERROR_LIMIT};
use crate::pipeline::{ConfigPipeline, ConfigStats, StatePipeline, StateStats};
use crate::registry::Registry;
use std::sync::Arc;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Errors stored per file before further ones are only counted.
    pub max_errors: usize,
    /// Run the registry's merge rules after per-resource transforms.
    pub merge_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_ERROR_LIMIT,
            merge_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }

    pub fn with_merge(mut self, enabled: bool) -> Self {
        self.merge_enabled = enabled;
        self
    }
}

/// Migrates configuration and state files with a fixed set of transformers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tfmigrate_core::{EngineConfig, MigrationContext, MigrationEngine, Registry};
///
/// let engine = MigrationEngine::new(Arc::new(Registry::new()), EngineConfig::default());
/// let output = engine
///     .process_config(b"resource \"a\" \"b\" {\nx=1\n}\n", "main.tf", &MigrationContext::default())
///     .unwrap();
/// assert_eq!(output, b"resource \"a\" \"b\" {\n  x = 1\n}\n");
/// ```
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    registry: Arc<Registry>,
    config: EngineConfig,
}

impl MigrationEngine {
    pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Migrate one configuration file.
    pub fn process_config(
        &self,
        bytes: &[u8],
        filename: &str,
        ctx: &MigrationContext,
    ) -> Result<Vec<u8>, ErrorList> {
        self.migrate_config(bytes, filename, ctx).map(|(bytes, _)| bytes)
    }

    /// Migrate one configuration file, returning counters alongside the text.
    pub fn migrate_config(
        &self,
        bytes: &[u8],
        filename: &str,
        ctx: &MigrationContext,
    ) -> Result<(Vec<u8>, ConfigStats), ErrorList> {
        ConfigPipeline::new(&self.registry, &self.config).run(bytes, filename, ctx)
    }

    /// Migrate one state file.
    pub fn process_state(
        &self,
        bytes: &[u8],
        filename: &str,
        ctx: &MigrationContext,
    ) -> Result<Vec<u8>, ErrorList> {
        self.migrate_state(bytes, filename, ctx).map(|(bytes, _)| bytes)
    }

    /// Migrate one state file, returning counters alongside the JSON.
    pub fn migrate_state(
        &self,
        bytes: &[u8],
        filename: &str,
        ctx: &MigrationContext,
    ) -> Result<(Vec<u8>, StateStats), ErrorList> {
        StatePipeline::new(&self.registry, &self.config).run(bytes, filename, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = EngineConfig::default().with_max_errors(0).with_merge(false);
        assert_eq!(config.max_errors, 1);
        assert!(!config.merge_enabled);
    }

    #[test]
    fn test_empty_registry_formats_only() {
        let engine = MigrationEngine::new(Arc::new(Registry::new()), EngineConfig::default());
        let ctx = MigrationContext::default();
        let output = engine
            .process_config(b"resource \"x\" \"y\" {\n  a=1\n  bb=2\n}\n", "main.tf", &ctx)
            .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "resource \"x\" \"y\" {\n  a  = 1\n  bb = 2\n}\n"
        );
    }
}
