//! Migration engine for Terraform configuration and state files.
//!
//! A run is driven by a [`Registry`] of [`Transformer`]s, one per resource
//! type, plus declarative [`MergeRule`]s that fold child resources into a
//! parent. The [`MigrationEngine`] feeds each file through a pipeline:
//!
//! - configuration: preprocess text, parse HCL, transform every `resource`
//!   block, merge, re-format;
//! - state: parse JSON, retype resources, transform every instance, merge,
//!   pretty-print.
//!
//! Per-resource failures are collected into an [`ErrorList`]; any failure
//! leaves the file untouched. The [`recovery`] module wraps file writes with
//! backups, retries and rollback.

pub mod context;
pub mod engine;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod primitives;
pub mod recovery;
pub mod registry;
pub mod transform;

pub use context::{MigrationContext, MigrationOptions, SOURCE_VERSION, TARGET_VERSION};
pub use engine::{EngineConfig, MigrationEngine};
pub use error::{ErrorKind, ErrorList, MigrationError, Result, DEFAULT_ERROR_LIMIT};
pub use merge::{MergeField, MergeOutcome, MergeRule};
pub use pipeline::{ConfigStats, StateStats};
pub use registry::{MigrationKey, MigratorFactory, MigratorTable, Registry};
pub use transform::{TransformResult, Transformer};
