//! Runs a migration over a directory and an optional state file.

use crate::config::RunConfig;
use crate::report::{FileKind, FileOutcome, FileReport, MigrationReport, RunStatus};
use crate::CliError;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfmigrate_core::recovery::{backup_checkpoint, BackupEntry, BackupManager, Recoverer};
use tfmigrate_core::{
    ErrorList, MigrationContext, MigrationEngine, MigrationError, MigratorTable,
};
use tracing::{debug, info, warn};

/// Migrate every `.tf` file under `config.dir`, then the state file.
///
/// Each file is rewritten inside a recovery checkpoint that backs it up
/// first. When a file fails under the fail-fast or retry strategies, every
/// file rewritten so far is restored. Errors that prevent the run from
/// starting are returned; per-file failures are recorded in the report.
pub fn run(config: &RunConfig, table: &MigratorTable) -> Result<MigrationReport, CliError> {
    let registry = table.build_registry(
        &config.source_version,
        &config.target_version,
        &config.resources,
    )?;
    info!(
        from = %config.source_version,
        to = %config.target_version,
        migrators = registry.len(),
        merge_rules = registry.merge_rules().len(),
        "built registry"
    );
    let engine = MigrationEngine::new(Arc::new(registry), config.engine.clone());

    let files = discover(&config.dir)?;
    let ctx = build_context(config, &files);

    let mut jobs: Vec<(PathBuf, FileKind)> =
        files.into_iter().map(|path| (path, FileKind::Config)).collect();
    if let Some(state) = &config.state_file {
        jobs.push((state.clone(), FileKind::State));
    }

    let manager = match &config.backup {
        Some(backup) if !config.dry_run => Some(BackupManager::new(backup.clone()).shared()),
        _ => None,
    };
    let mut recoverer = Recoverer::new(config.recovery.clone());
    let mut report = MigrationReport::new(&config.source_version, &config.target_version, config.dry_run);
    let mut aborted = false;

    for (path, kind) in jobs {
        let mut file = FileReport::new(display_path(&config.dir, &path), kind);
        let operation = file.path.clone();

        if let Some(manager) = &manager {
            if let Err(err) = recoverer.checkpoint(backup_checkpoint(manager, path.clone())) {
                file.fail(&ErrorList::single(err));
                report.push(file);
                aborted = true;
                break;
            }
        }

        let result = recoverer.execute(&operation, |deadline| {
            file.reset();
            let result = deadline
                .check("migrate")
                .map_err(ErrorList::single)
                .and_then(|()| migrate_file(&engine, &ctx, &path, kind, config.dry_run, &mut file));
            result.map_err(|errors| {
                file.fail(&errors);
                summarize(&operation, &errors)
            })
        });

        if config.keep_backups && file.outcome == FileOutcome::Changed {
            if let Some(manager) = &manager {
                if let Some(BackupEntry::Copied(record)) = manager.lock().entry(&path) {
                    file.backup = Some(record.backup_path.display().to_string());
                }
            }
        }
        report.push(file);

        if let Err(err) = result {
            warn!(file = %operation, error = %err, "migration failed");
            aborted = true;
            break;
        }
    }

    let status = if aborted {
        if manager.is_some() {
            if let Err(errors) = recoverer.rollback() {
                report.record_recovery_errors(&errors);
            }
            RunStatus::RolledBack
        } else {
            RunStatus::Failed
        }
    } else if report.count(FileOutcome::Failed) > 0 {
        RunStatus::CompletedWithErrors
    } else {
        RunStatus::Succeeded
    };

    if aborted || !config.keep_backups {
        if let Err(errors) = recoverer.cleanup() {
            report.record_recovery_errors(&errors);
        }
    }

    report.finish(status);
    info!(
        status = %report.status,
        changed = report.count(FileOutcome::Changed),
        failed = report.count(FileOutcome::Failed),
        "migration finished"
    );
    Ok(report)
}

/// Migrate one file and write it back when it changed.
fn migrate_file(
    engine: &MigrationEngine,
    ctx: &MigrationContext,
    path: &Path,
    kind: FileKind,
    dry_run: bool,
    file: &mut FileReport,
) -> Result<(), ErrorList> {
    // Keyed like the context's files.
    let name = file.path.clone();
    let bytes = fs::read(path).map_err(|e| {
        MigrationError::from(e)
            .with_operation("read")
            .with_file(&name)
    })?;

    let output = match kind {
        FileKind::Config => {
            let (output, stats) = engine.migrate_config(&bytes, &name, ctx)?;
            file.transformed = stats.transformed;
            file.merged = stats.merged;
            output
        }
        FileKind::State => {
            let (output, stats) = engine.migrate_state(&bytes, &name, ctx)?;
            file.transformed = stats.transformed;
            file.retyped = stats.retyped;
            file.merged = stats.merged;
            output
        }
    };

    if output == bytes {
        debug!(file = %name, "unchanged");
        return Ok(());
    }
    file.outcome = FileOutcome::Changed;
    if dry_run {
        return Ok(());
    }
    fs::write(path, &output).map_err(|e| {
        MigrationError::from(e)
            .with_operation("write")
            .with_file(&name)
    })?;
    debug!(file = %name, bytes = output.len(), "wrote migrated file");
    Ok(())
}

/// One error standing for a failed file, retryable only when every
/// underlying error is.
fn summarize(file: &str, errors: &ErrorList) -> MigrationError {
    let kind = errors
        .iter()
        .next()
        .map(|e| e.kind)
        .unwrap_or(tfmigrate_core::ErrorKind::Transform);
    let recoverable = !errors.is_empty() && errors.iter().all(MigrationError::is_recoverable);
    MigrationError::new(kind, errors.to_string())
        .with_file(file)
        .with_recoverable(recoverable)
}

/// `.tf` files under `dir`, sorted. Hidden directories such as `.terraform`
/// are skipped.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| {
            MigrationError::from(e)
                .with_operation("discover")
                .with_file(current.display().to_string())
        })?;
        for entry in entries {
            let path = entry.map_err(MigrationError::from)?.path();
            let hidden = path
                .file_name()
                .map_or(false, |n| n.to_string_lossy().starts_with('.'));
            if path.is_dir() {
                if !hidden {
                    pending.push(path);
                }
            } else if path.extension().map_or(false, |ext| ext == "tf") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// The context every transform sees: run options, the state snapshot and
/// every configuration file that parses.
fn build_context(config: &RunConfig, files: &[PathBuf]) -> MigrationContext {
    let mut ctx = MigrationContext::new(&config.source_version, &config.target_version)
        .with_options(config.options.clone());

    if let Some(path) = &config.state_file {
        match fs::read(path).map(|bytes| serde_json::from_slice::<Value>(&bytes)) {
            Ok(Ok(state)) => ctx = ctx.with_state(state),
            Ok(Err(err)) => warn!(file = %path.display(), error = %err, "state is not valid JSON"),
            Err(err) => warn!(file = %path.display(), error = %err, "could not read state"),
        }
    }

    for path in files {
        let Ok(source) = fs::read_to_string(path) else {
            continue;
        };
        match tfmigrate_hcl::parse_body(&source) {
            Ok(body) => ctx = ctx.with_file(display_path(&config.dir, path), body),
            Err(err) => debug!(file = %path.display(), error = %err, "skipping unparseable file in context"),
        }
    }
    ctx
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Registered migrators, optionally restricted to a version pair.
pub fn list_migrators(table: &MigratorTable, from: Option<&str>, to: Option<&str>) -> Vec<String> {
    table
        .keys()
        .into_iter()
        .filter(|key| from.map_or(true, |v| key.source_version == v))
        .filter(|key| to.map_or(true, |v| key.target_version == v))
        .map(|key| key.to_string())
        .collect()
}
