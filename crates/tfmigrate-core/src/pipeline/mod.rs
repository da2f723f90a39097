//! File pipelines: decode, dispatch to transformers, merge, re-encode.

mod config;
mod state;

pub use config::{ConfigPipeline, ConfigStats};
pub use state::{StatePipeline, StateStats};
