//! State (JSON) pipeline.

use crate::context::MigrationContext;
use crate::engine::EngineConfig;
use crate::error::{ErrorList, MigrationError};
use crate::merge::merge_state;
use crate::registry::Registry;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Per-file counters of a state run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateStats {
    /// Resource entries whose type was rewritten.
    pub retyped: usize,
    /// Instances changed by a transformer.
    pub transformed: usize,
    /// Item instances folded into a parent by a merge rule.
    pub merged: usize,
}

/// Runs one state file through the registered transformers.
pub struct StatePipeline<'a> {
    registry: &'a Registry,
    config: &'a EngineConfig,
}

impl<'a> StatePipeline<'a> {
    pub fn new(registry: &'a Registry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Transform a state file, returning pretty-printed JSON.
    ///
    /// A document without `resources` is returned byte for byte. Any recorded
    /// error aborts the file.
    pub fn run(
        &self,
        bytes: &[u8],
        filename: &str,
        ctx: &MigrationContext,
    ) -> Result<(Vec<u8>, StateStats), ErrorList> {
        let mut state: Value = serde_json::from_slice(bytes).map_err(|e| {
            MigrationError::from(e)
                .with_operation("parse")
                .with_file(filename)
        })?;
        let mut stats = StateStats::default();

        let Some(resources) = state.get_mut("resources") else {
            debug!(file = filename, "state has no resources, leaving it unchanged");
            return Ok((bytes.to_vec(), stats));
        };
        let Some(resources) = resources.as_array_mut() else {
            return Err(MigrationError::state("resources is not an array")
                .with_operation("parse")
                .with_file(filename)
                .into());
        };

        let mut errors = ErrorList::new(self.config.max_errors);
        for (r, resource) in resources.iter_mut().enumerate() {
            self.transform_resource(r, resource, filename, ctx, &mut errors, &mut stats);
        }

        if errors.has_errors() {
            return Err(errors);
        }

        if self.config.merge_enabled {
            for rule in self.registry.merge_rules() {
                match merge_state(&mut state, rule) {
                    Ok(outcome) => stats.merged += outcome.merged,
                    Err(err) => errors.push(err.with_file(filename)),
                }
            }
            if errors.has_errors() {
                return Err(errors);
            }
        }

        info!(
            file = filename,
            retyped = stats.retyped,
            transformed = stats.transformed,
            merged = stats.merged,
            "migrated state"
        );
        Ok((serialize(&state, bytes), stats))
    }

    fn transform_resource(
        &self,
        r: usize,
        resource: &mut Value,
        filename: &str,
        ctx: &MigrationContext,
        errors: &mut ErrorList,
        stats: &mut StateStats,
    ) {
        let Some(resource_type) = resource.get("type").and_then(Value::as_str).map(str::to_string)
        else {
            return;
        };
        if resource.get("mode").and_then(Value::as_str).unwrap_or("managed") != "managed" {
            return;
        }
        let Some(transformer) = self.registry.find(&resource_type) else {
            return;
        };
        let name = resource
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let address = format!("{}.{}", resource_type, name);

        if let Some(target) = transformer.target_resource_type_for(resource) {
            if target != resource_type {
                match resource.as_object_mut() {
                    Some(map) => {
                        map.insert("type".to_string(), Value::String(target.clone()));
                        stats.retyped += 1;
                        debug!(resource = %address, target = %target, "rewrote resource type");
                    }
                    None => errors.push(
                        MigrationError::state("resource entry is not an object")
                            .with_operation("rename_type")
                            .with_resource(&address)
                            .with_file(filename),
                    ),
                }
            }
        }

        let Some(instances) = resource.get_mut("instances").and_then(Value::as_array_mut) else {
            return;
        };
        for (i, slot) in instances.iter_mut().enumerate() {
            let path = format!("resources.{}.instances.{}", r, i);
            debug!(resource = %address, path = %path, "transforming state instance");
            match transformer.transform_state(ctx, slot.clone(), &path) {
                Ok(updated) => {
                    if updated != *slot {
                        *slot = updated;
                        stats.transformed += 1;
                    }
                }
                Err(err) => {
                    let mut err = err;
                    if err.operation.is_none() {
                        err = err.with_operation("transform_state");
                    }
                    if err.resource.is_none() {
                        err = err.with_resource(&address);
                    }
                    if err.version.is_none() {
                        err = err.with_version(ctx.version_label());
                    }
                    errors.push(err.with_file(filename).with_context("path", &path));
                }
            }
        }
    }
}

/// Pretty-print with two-space indentation, keeping a trailing newline if
/// the input had one. Falls back to the original bytes.
fn serialize(state: &Value, original: &[u8]) -> Vec<u8> {
    match serde_json::to_vec_pretty(state) {
        Ok(mut out) => {
            if original.ends_with(b"\n") {
                out.push(b'\n');
            }
            out
        }
        Err(err) => {
            warn!(error = %err, "could not serialize state, keeping original bytes");
            original.to_vec()
        }
    }
}
