//! Cross-resource merges: folding child resources into a parent collection.
//!
//! A [`MergeRule`] describes the relationship once; [`merge_config`] and
//! [`merge_state`] apply it to a configuration document and a state file.

mod config;
mod rule;
mod state;

pub use config::{merge_config, MergeOutcome, MERGE_COMMENT_PREFIX};
pub use rule::{FieldKind, MergeField, MergeRule};
pub use state::merge_state;
