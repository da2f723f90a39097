//! Per-run migration report.

use crate::config::OutputFormat;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tfmigrate_core::{ErrorKind, ErrorList, MigrationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Config,
    State,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// Rewritten, or would be in a dry run.
    Changed,
    Unchanged,
    Failed,
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Changed => write!(f, "changed"),
            FileOutcome::Unchanged => write!(f, "unchanged"),
            FileOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MigrationError> for ErrorEntry {
    fn from(err: &MigrationError) -> Self {
        Self {
            kind: err.kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: String,
    pub kind: FileKind,
    pub outcome: FileOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    /// Blocks or instances rewritten by a migrator.
    pub transformed: usize,
    /// Resource entries whose type changed (state only).
    pub retyped: usize,
    /// Child resources folded into a parent.
    pub merged: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
    /// Errors counted but not recorded once the limit was reached.
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_errors: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl FileReport {
    pub fn new(path: impl Into<String>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
            outcome: FileOutcome::Unchanged,
            backup: None,
            transformed: 0,
            retyped: 0,
            merged: 0,
            errors: Vec::new(),
            dropped_errors: 0,
        }
    }

    /// Clear counters and errors before another attempt.
    pub fn reset(&mut self) {
        self.outcome = FileOutcome::Unchanged;
        self.transformed = 0;
        self.retyped = 0;
        self.merged = 0;
        self.errors.clear();
        self.dropped_errors = 0;
    }

    /// Mark the file failed with every error of the list.
    pub fn fail(&mut self, errors: &ErrorList) {
        self.outcome = FileOutcome::Failed;
        self.errors = errors.iter().map(ErrorEntry::from).collect();
        self.dropped_errors = errors.dropped();
    }

    fn counters(&self) -> String {
        let mut parts = Vec::new();
        if self.transformed > 0 {
            parts.push(format!("{} transformed", self.transformed));
        }
        if self.retyped > 0 {
            parts.push(format!("{} retyped", self.retyped));
        }
        if self.merged > 0 {
            parts.push(format!("{} merged", self.merged));
        }
        parts.join(", ")
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// Some files failed and were left untouched; the rest were migrated.
    CompletedWithErrors,
    /// A file failed and every rewritten file was restored.
    RolledBack,
    /// A file failed and nothing could be restored.
    Failed,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::CompletedWithErrors => write!(f, "completed with errors"),
            RunStatus::RolledBack => write!(f, "rolled back"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub source_version: String,
    pub target_version: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub files: Vec<FileReport>,
    /// Failures while restoring files or removing backups.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recovery_errors: Vec<ErrorEntry>,
}

impl MigrationReport {
    pub fn new(source_version: &str, target_version: &str, dry_run: bool) -> Self {
        Self {
            source_version: source_version.to_string(),
            target_version: target_version.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Succeeded,
            files: Vec::new(),
            recovery_errors: Vec::new(),
        }
    }

    pub fn push(&mut self, file: FileReport) {
        self.files.push(file);
    }

    pub fn count(&self, outcome: FileOutcome) -> usize {
        self.files.iter().filter(|f| f.outcome == outcome).count()
    }

    pub fn record_recovery_errors(&mut self, errors: &ErrorList) {
        self.recovery_errors
            .extend(errors.iter().map(ErrorEntry::from));
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Render in the requested format.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(self.to_string()),
            OutputFormat::Json => serde_json::to_string_pretty(self),
        }
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tfmigrate {} -> {}", self.source_version, self.target_version)?;
        if self.dry_run {
            write!(f, " (dry run)")?;
        }
        writeln!(f)?;

        for file in &self.files {
            write!(f, "  {:<10} {}", file.outcome.to_string(), file.path)?;
            let counters = file.counters();
            if !counters.is_empty() {
                write!(f, " ({})", counters)?;
            }
            if let Some(backup) = &file.backup {
                write!(f, " [backup: {}]", backup)?;
            }
            writeln!(f)?;
            for error in &file.errors {
                writeln!(f, "      - {}", error.message)?;
            }
            if file.dropped_errors > 0 {
                writeln!(f, "      ... and {} more", file.dropped_errors)?;
            }
        }
        for error in &self.recovery_errors {
            writeln!(f, "  recovery: {}", error.message)?;
        }

        write!(
            f,
            "{}: {} changed, {} unchanged, {} failed",
            self.status,
            self.count(FileOutcome::Changed),
            self.count(FileOutcome::Unchanged),
            self.count(FileOutcome::Failed)
        )
    }
}
