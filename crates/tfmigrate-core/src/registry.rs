//! Transformer registry and the version-keyed migrator table.

use crate::error::{MigrationError, Result};
use crate::merge::MergeRule;
use crate::transform::Transformer;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Ordered set of transformers used by a migration run.
///
/// Populated once before processing starts and read-only afterwards, so it
/// can be shared between threads behind an `Arc`.
#[derive(Default)]
pub struct Registry {
    transformers: Vec<Arc<dyn Transformer>>,
    merge_rules: Vec<MergeRule>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transformer.
    ///
    /// Fails with a config error when the new transformer's claim overlaps
    /// one already registered, since lookup would otherwise depend on
    /// registration order.
    pub fn register(&mut self, transformer: Arc<dyn Transformer>) -> Result<()> {
        let claimed = transformer.resource_type();
        if let Some(existing) = self
            .transformers
            .iter()
            .find(|t| t.can_handle(claimed) || transformer.can_handle(t.resource_type()))
        {
            return Err(MigrationError::config(format!(
                "transformer for {} overlaps the one registered for {}",
                claimed,
                existing.resource_type()
            ))
            .with_operation("register"));
        }

        debug!(resource_type = claimed, "registered transformer");
        self.transformers.push(transformer);
        Ok(())
    }

    /// Add a cross-resource merge rule.
    pub fn register_merge_rule(&mut self, rule: MergeRule) {
        debug!(item = %rule.item_type, parent = %rule.parent_type, "registered merge rule");
        self.merge_rules.push(rule);
    }

    /// Find the transformer handling a resource type.
    pub fn find(&self, resource_type: &str) -> Option<&Arc<dyn Transformer>> {
        self.transformers.iter().find(|t| t.can_handle(resource_type))
    }

    /// Transformers in registration order.
    pub fn transformers(&self) -> impl Iterator<Item = &Arc<dyn Transformer>> {
        self.transformers.iter()
    }

    pub fn merge_rules(&self) -> &[MergeRule] {
        &self.merge_rules
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty() && self.merge_rules.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field(
                "transformers",
                &self
                    .transformers
                    .iter()
                    .map(|t| t.resource_type())
                    .collect::<Vec<_>>(),
            )
            .field("merge_rules", &self.merge_rules.len())
            .finish()
    }
}

/// Identifies a migrator registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MigrationKey {
    pub resource_type: String,
    pub source_version: String,
    pub target_version: String,
}

impl MigrationKey {
    pub fn new(
        resource_type: impl Into<String>,
        source_version: impl Into<String>,
        target_version: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            source_version: source_version.into(),
            target_version: target_version.into(),
        }
    }

    fn matches_versions(&self, source_version: &str, target_version: &str) -> bool {
        self.source_version == source_version && self.target_version == target_version
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} -> {})",
            self.resource_type, self.source_version, self.target_version
        )
    }
}

/// Creates a fresh migrator instance.
pub type MigratorFactory = fn() -> Box<dyn Transformer>;

/// Explicit table of migrator factories keyed by resource type and versions.
///
/// Built once at startup from a static list and handed to the engine, in
/// place of plugins registering themselves into global state.
#[derive(Default, Clone)]
pub struct MigratorTable {
    migrators: BTreeMap<MigrationKey, MigratorFactory>,
    merge_rules: Vec<(MigrationKey, MergeRule)>,
}

impl MigratorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migrator factory. A later registration for the same key
    /// replaces the earlier one.
    pub fn register_migrator(
        &mut self,
        resource_type: &str,
        source_version: &str,
        target_version: &str,
        factory: MigratorFactory,
    ) {
        let key = MigrationKey::new(resource_type, source_version, target_version);
        if self.migrators.insert(key.clone(), factory).is_some() {
            debug!(%key, "replaced migrator registration");
        }
    }

    /// Register a merge rule for a version transition, keyed by item type.
    pub fn register_merge_rule(&mut self, source_version: &str, target_version: &str, rule: MergeRule) {
        let key = MigrationKey::new(rule.item_type.clone(), source_version, target_version);
        self.merge_rules.retain(|(k, _)| k != &key);
        self.merge_rules.push((key, rule));
    }

    /// Instantiate the migrator registered for an exact key.
    pub fn get_migrator(
        &self,
        resource_type: &str,
        source_version: &str,
        target_version: &str,
    ) -> Option<Box<dyn Transformer>> {
        let key = MigrationKey::new(resource_type, source_version, target_version);
        self.migrators.get(&key).map(|factory| factory())
    }

    /// Instantiate every migrator for a version transition.
    ///
    /// A non-empty `filter` restricts the result to the named resource types.
    pub fn get_all_migrators(
        &self,
        source_version: &str,
        target_version: &str,
        filter: &[String],
    ) -> Vec<Box<dyn Transformer>> {
        self.migrators
            .iter()
            .filter(|(key, _)| key.matches_versions(source_version, target_version))
            .filter(|(key, _)| filter.is_empty() || filter.contains(&key.resource_type))
            .map(|(_, factory)| factory())
            .collect()
    }

    /// Merge rules for a version transition, filtered like migrators. A rule
    /// passes the filter when either its item or parent type is named.
    pub fn get_merge_rules(
        &self,
        source_version: &str,
        target_version: &str,
        filter: &[String],
    ) -> Vec<MergeRule> {
        self.merge_rules
            .iter()
            .filter(|(key, _)| key.matches_versions(source_version, target_version))
            .filter(|(_, rule)| {
                filter.is_empty()
                    || filter.contains(&rule.item_type)
                    || filter.contains(&rule.parent_type)
            })
            .map(|(_, rule)| rule.clone())
            .collect()
    }

    /// All registered keys, migrators and merge rules alike, in order.
    pub fn keys(&self) -> Vec<MigrationKey> {
        let mut keys: Vec<MigrationKey> = self.migrators.keys().cloned().collect();
        keys.extend(self.merge_rules.iter().map(|(key, _)| key.clone()));
        keys.sort();
        keys
    }

    /// Whether anything is registered for a version transition.
    pub fn supports(&self, source_version: &str, target_version: &str) -> bool {
        self.keys()
            .iter()
            .any(|k| k.matches_versions(source_version, target_version))
    }

    /// Build a registry for one version transition.
    pub fn build_registry(
        &self,
        source_version: &str,
        target_version: &str,
        filter: &[String],
    ) -> Result<Registry> {
        if !self.supports(source_version, target_version) {
            return Err(MigrationError::version(format!(
                "no migrations registered from {} to {}",
                source_version, target_version
            ))
            .with_version(format!("{} -> {}", source_version, target_version)));
        }

        let mut registry = Registry::new();
        for migrator in self.get_all_migrators(source_version, target_version, filter) {
            registry.register(Arc::from(migrator))?;
        }
        for rule in self.get_merge_rules(source_version, target_version, filter) {
            registry.register_merge_rule(rule);
        }
        Ok(registry)
    }
}

impl fmt::Debug for MigratorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigratorTable")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MigrationContext;
    use crate::error::ErrorKind;
    use crate::transform::TransformResult;
    use serde_json::Value;
    use tfmigrate_hcl::Block;

    struct Fixed(&'static str);

    impl Transformer for Fixed {
        fn can_handle(&self, resource_type: &str) -> bool {
            resource_type == self.0
        }

        fn resource_type(&self) -> &str {
            self.0
        }

        fn transform_config(&self, _ctx: &MigrationContext, block: Block) -> Result<TransformResult> {
            Ok(TransformResult::in_place(block))
        }

        fn transform_state(&self, _ctx: &MigrationContext, instance: Value, _path: &str) -> Result<Value> {
            Ok(instance)
        }
    }

    struct Prefix;

    impl Transformer for Prefix {
        fn can_handle(&self, resource_type: &str) -> bool {
            resource_type.starts_with("cloudflare_")
        }

        fn resource_type(&self) -> &str {
            "cloudflare_*"
        }

        fn transform_config(&self, _ctx: &MigrationContext, block: Block) -> Result<TransformResult> {
            Ok(TransformResult::in_place(block))
        }

        fn transform_state(&self, _ctx: &MigrationContext, instance: Value, _path: &str) -> Result<Value> {
            Ok(instance)
        }
    }

    fn record() -> Box<dyn Transformer> {
        Box::new(Fixed("cloudflare_record"))
    }

    fn list() -> Box<dyn Transformer> {
        Box::new(Fixed("cloudflare_list"))
    }

    #[test]
    fn test_find_first_match() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Fixed("cloudflare_record"))).unwrap();
        registry.register(Arc::new(Fixed("cloudflare_list"))).unwrap();

        assert_eq!(
            registry.find("cloudflare_list").map(|t| t.resource_type()),
            Some("cloudflare_list")
        );
        assert!(registry.find("cloudflare_zone").is_none());
    }

    #[test]
    fn test_overlapping_claims_rejected() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Fixed("cloudflare_record"))).unwrap();

        let err = registry.register(Arc::new(Prefix)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);

        let err = registry
            .register(Arc::new(Fixed("cloudflare_record")))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_table_lookup_and_filter() {
        let mut table = MigratorTable::new();
        table.register_migrator("cloudflare_record", "v4", "v5", record);
        table.register_migrator("cloudflare_list", "v4", "v5", list);
        table.register_migrator("cloudflare_list", "v3", "v4", list);

        assert!(table.get_migrator("cloudflare_record", "v4", "v5").is_some());
        assert!(table.get_migrator("cloudflare_record", "v3", "v4").is_none());

        assert_eq!(table.get_all_migrators("v4", "v5", &[]).len(), 2);
        let filtered = table.get_all_migrators("v4", "v5", &["cloudflare_list".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].resource_type(), "cloudflare_list");
    }

    #[test]
    fn test_last_registration_wins() {
        let mut table = MigratorTable::new();
        table.register_migrator("cloudflare_record", "v4", "v5", list);
        table.register_migrator("cloudflare_record", "v4", "v5", record);

        let migrator = table.get_migrator("cloudflare_record", "v4", "v5").unwrap();
        assert_eq!(migrator.resource_type(), "cloudflare_record");
        assert_eq!(table.keys().len(), 1);
    }

    #[test]
    fn test_build_registry() {
        let mut table = MigratorTable::new();
        table.register_migrator("cloudflare_record", "v4", "v5", record);
        table.register_merge_rule("v4", "v5", MergeRule::new("cloudflare_list_item", "cloudflare_list", "items"));

        let registry = table.build_registry("v4", "v5", &[]).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.merge_rules().len(), 1);

        let err = table.build_registry("v5", "v6", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Version);
    }
}
