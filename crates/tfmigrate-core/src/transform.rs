//! The per-resource-type transformer contract.

use crate::context::MigrationContext;
use crate::error::Result;
use serde_json::Value;
use tfmigrate_hcl::Block;

/// Output of a single-block configuration transform.
///
/// An empty `blocks` with `remove_original` deletes the block, one block
/// without `remove_original` is an in-place edit, and several blocks with
/// `remove_original` split the resource. When `remove_original` is false,
/// `blocks` must hold exactly the (possibly mutated) original block.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub blocks: Vec<Block>,
    pub remove_original: bool,
}

impl TransformResult {
    /// The block was edited in place.
    pub fn in_place(block: Block) -> Self {
        Self {
            blocks: vec![block],
            remove_original: false,
        }
    }

    /// Replace the original block with the given blocks.
    pub fn replace(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            remove_original: true,
        }
    }

    /// Remove the original block without a replacement.
    pub fn delete() -> Self {
        Self {
            blocks: Vec::new(),
            remove_original: true,
        }
    }
}

/// A migrator for one resource type and one version transition.
///
/// Implementations must claim disjoint resource types: the registry rejects
/// a transformer whose claim overlaps one already registered.
pub trait Transformer: Send + Sync {
    /// Whether this transformer handles the given resource type.
    fn can_handle(&self, resource_type: &str) -> bool;

    /// The resource type this transformer was registered for.
    fn resource_type(&self) -> &str;

    /// The new resource type, if the type is renamed.
    fn target_resource_type(&self) -> Option<&str> {
        None
    }

    /// The new resource type for a specific state resource entry.
    ///
    /// Defaults to [`Transformer::target_resource_type`]; override when the
    /// new type depends on the resource's recorded attributes.
    fn target_resource_type_for(&self, _resource: &Value) -> Option<String> {
        self.target_resource_type().map(str::to_string)
    }

    /// Rewrite raw configuration text before it is parsed.
    fn preprocess(&self, content: String) -> String {
        content
    }

    /// Rewrite one `resource` block.
    fn transform_config(&self, ctx: &MigrationContext, block: Block) -> Result<TransformResult>;

    /// Rewrite one state instance found at `path` (e.g. `resources.3.instances.0`).
    fn transform_state(&self, ctx: &MigrationContext, instance: Value, path: &str) -> Result<Value>;
}
