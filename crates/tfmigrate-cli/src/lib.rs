//! The `tfmigrate` command line: argument parsing, the file-level migration
//! run and its report.

pub mod config;
pub mod report;
pub mod runner;

pub use config::{Cli, Command, ListArgs, MigrateArgs, OutputFormat, RunConfig};
pub use report::{FileKind, FileOutcome, FileReport, MigrationReport, RunStatus};
pub use runner::{discover, list_migrators, run};

use thiserror::Error;
use tfmigrate_core::{ErrorList, MigrationError};

/// Errors that stop a run before any file is processed.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Errors(#[from] ErrorList),

    #[error("could not render report: {0}")]
    Report(#[from] serde_json::Error),
}
