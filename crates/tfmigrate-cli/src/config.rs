//! Command-line arguments and the run configuration built from them.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tfmigrate_core::recovery::{BackupConfig, RecoveryConfig, RecoveryStrategy};
use tfmigrate_core::{EngineConfig, MigrationOptions, DEFAULT_ERROR_LIMIT, SOURCE_VERSION, TARGET_VERSION};

/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human readable summary
    #[default]
    Text,
    /// JSON document
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Migrate Terraform configuration and state between provider versions.
#[derive(Parser, Debug)]
#[command(name = "tfmigrate")]
#[command(version, about = "Terraform configuration and state migrator", long_about = None)]
pub struct Cli {
    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate a directory of .tf files and an optional state file.
    Migrate(MigrateArgs),
    /// List the registered migrators.
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Directory holding the configuration.
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// State file to migrate alongside the configuration.
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    /// Source provider version.
    #[arg(long, default_value = SOURCE_VERSION)]
    pub from: String,

    /// Target provider version.
    #[arg(long, default_value = TARGET_VERSION)]
    pub to: String,

    /// Only migrate these resource types (comma separated).
    #[arg(short, long, value_delimiter = ',')]
    pub resources: Vec<String>,

    /// Compute and report changes without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not back up files before rewriting them.
    #[arg(long)]
    pub no_backup: bool,

    /// Keep backups after a successful run.
    #[arg(long)]
    pub keep_backups: bool,

    /// Directory for backups (defaults to next to each file).
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Emit `moved` blocks for resources that change type.
    #[arg(long)]
    pub moved_blocks: bool,

    /// Disable merging child resources into their parent.
    #[arg(long)]
    pub no_merge: bool,

    /// Errors reported per file before the rest are only counted.
    #[arg(long, default_value_t = DEFAULT_ERROR_LIMIT)]
    pub max_errors: usize,

    /// Retry failed file operations this many times (0 = fail fast).
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Delay before the first retry in milliseconds.
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Keep going after a file fails instead of rolling back.
    #[arg(long, conflicts_with = "retries")]
    pub continue_on_error: bool,

    /// Per-file time limit in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Report format.
    #[arg(long, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Only list migrators from this version.
    #[arg(long)]
    pub from: Option<String>,

    /// Only list migrators to this version.
    #[arg(long)]
    pub to: Option<String>,
}

/// Everything a migration run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub dir: PathBuf,
    pub state_file: Option<PathBuf>,
    pub source_version: String,
    pub target_version: String,
    /// Resource type allowlist; empty means every type.
    pub resources: Vec<String>,
    pub dry_run: bool,
    /// Backups to take, or `None` to write without them.
    pub backup: Option<BackupConfig>,
    pub keep_backups: bool,
    pub engine: EngineConfig,
    pub options: MigrationOptions,
    pub recovery: RecoveryConfig,
    pub format: OutputFormat,
}

impl RunConfig {
    /// A configuration for `dir` with default settings.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state_file: None,
            source_version: SOURCE_VERSION.to_string(),
            target_version: TARGET_VERSION.to_string(),
            resources: Vec::new(),
            dry_run: false,
            backup: Some(BackupConfig::default()),
            keep_backups: false,
            engine: EngineConfig::default(),
            options: MigrationOptions::default(),
            recovery: RecoveryConfig::default(),
            format: OutputFormat::Text,
        }
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }

    pub fn without_backup(mut self) -> Self {
        self.backup = None;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }
}

impl MigrateArgs {
    /// Convert command-line arguments to a run configuration.
    pub fn into_config(self) -> RunConfig {
        let backup = if self.no_backup {
            None
        } else {
            let config = BackupConfig::default();
            Some(match self.backup_dir {
                Some(dir) => config.with_backup_dir(dir),
                None => config,
            })
        };

        let strategy = if self.continue_on_error {
            RecoveryStrategy::ContinueOnError
        } else if self.retries > 0 {
            RecoveryStrategy::retry(self.retries + 1, Duration::from_millis(self.retry_delay_ms))
        } else {
            RecoveryStrategy::FailFast
        };
        let mut recovery = RecoveryConfig::default().with_strategy(strategy);
        if let Some(secs) = self.timeout {
            recovery = recovery.with_timeout(Duration::from_secs(secs));
        }

        RunConfig {
            dir: self.dir,
            state_file: self.state,
            source_version: self.from,
            target_version: self.to,
            resources: self.resources,
            dry_run: self.dry_run,
            backup,
            keep_backups: self.keep_backups,
            engine: EngineConfig::default()
                .with_max_errors(self.max_errors)
                .with_merge(!self.no_merge),
            options: MigrationOptions::default().with_moved_blocks(self.moved_blocks),
            recovery,
            format: self.format,
        }
    }
}
