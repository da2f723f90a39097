//! Read-only context threaded through every transform call.

use crate::primitives::hcl::expression_to_json;
use serde_json::Value;
use std::collections::BTreeMap;
use tfmigrate_hcl::{Body, Expression};

/// Source version handled by the builtin migrators.
pub const SOURCE_VERSION: &str = "v4";

/// Target version produced by the builtin migrators.
pub const TARGET_VERSION: &str = "v5";

/// Options that change what migrators emit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Emit `moved` blocks when a resource changes type.
    pub emit_moved_blocks: bool,
}

impl MigrationOptions {
    pub fn with_moved_blocks(mut self, enabled: bool) -> Self {
        self.emit_moved_blocks = enabled;
        self
    }
}

/// What a migrator may consult besides the block or instance it rewrites.
///
/// Holds the version transition, run options, the pre-migration state
/// snapshot (if one was supplied) and the parsed configuration files, so a
/// configuration transform can resolve what a reference evaluates to.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub source_version: String,
    pub target_version: String,
    pub options: MigrationOptions,
    state: Option<Value>,
    files: BTreeMap<String, Body>,
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self::new(SOURCE_VERSION, TARGET_VERSION)
    }
}

impl MigrationContext {
    /// Create a context for a version transition.
    pub fn new(source_version: impl Into<String>, target_version: impl Into<String>) -> Self {
        Self {
            source_version: source_version.into(),
            target_version: target_version.into(),
            options: MigrationOptions::default(),
            state: None,
            files: BTreeMap::new(),
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach the pre-migration state snapshot.
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Attach a parsed configuration file.
    pub fn with_file(mut self, name: impl Into<String>, body: Body) -> Self {
        self.files.insert(name.into(), body);
        self
    }

    /// `v4 -> v5` style label for diagnostics.
    pub fn version_label(&self) -> String {
        format!("{} -> {}", self.source_version, self.target_version)
    }

    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    pub fn file(&self, name: &str) -> Option<&Body> {
        self.files.get(name)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &Body)> {
        self.files.iter().map(|(name, body)| (name.as_str(), body))
    }

    /// Find a resource entry in the state snapshot.
    pub fn state_resource(&self, resource_type: &str, name: &str) -> Option<&Value> {
        self.state
            .as_ref()?
            .get("resources")?
            .as_array()?
            .iter()
            .find(|r| {
                r.get("mode").and_then(Value::as_str).unwrap_or("managed") == "managed"
                    && r.get("type").and_then(Value::as_str) == Some(resource_type)
                    && r.get("name").and_then(Value::as_str) == Some(name)
            })
    }

    /// An attribute of the first instance of a resource in the state snapshot.
    pub fn state_attribute(&self, resource_type: &str, name: &str, attribute: &str) -> Option<&Value> {
        self.state_resource(resource_type, name)?
            .get("instances")?
            .as_array()?
            .first()?
            .get("attributes")?
            .get(attribute)
            .filter(|v| !v.is_null())
    }

    /// The literal default of a `variable` declared in any attached file.
    pub fn variable_default(&self, name: &str) -> Option<&Expression> {
        self.files.values().find_map(|body| {
            body.blocks()
                .find(|b| b.ident == "variable" && b.label(0) == Some(name))?
                .body
                .get("default")
        })
    }

    /// Evaluate an expression to a JSON value when it is statically known.
    ///
    /// Literals evaluate to themselves, `var.x` to the literal default of
    /// variable `x`, and `type.name.attr` to the attribute recorded for that
    /// resource in the state snapshot.
    pub fn resolve(&self, expr: &Expression) -> Option<Value> {
        if let Some(value) = expression_to_json(expr) {
            return Some(value);
        }

        let path = expr.as_reference_path()?;
        match path.as_slice() {
            [var, name] if var == "var" => self.variable_default(name).and_then(expression_to_json),
            [resource_type, name, attribute] => self
                .state_attribute(resource_type, name, attribute)
                .cloned(),
            _ => None,
        }
    }
}
