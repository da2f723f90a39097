//! File backups taken before a file is rewritten.

use crate::error::{ErrorList, MigrationError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where and how backups are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Directory receiving backups; next to the original when unset.
    pub backup_dir: Option<PathBuf>,
    /// Appended to the original file name.
    pub suffix: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: None,
            suffix: ".backup".to_string(),
        }
    }
}

impl BackupConfig {
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }
}

/// A backup copy of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub backup_path: PathBuf,
    /// Hex-encoded SHA-256 of the original content.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// What was found when a path was first backed up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupEntry {
    /// The file existed and was copied.
    Copied(BackupRecord),
    /// The file did not exist; rollback removes whatever was created there.
    Absent,
}

/// Tracks the backups taken during one run.
#[derive(Debug, Default)]
pub struct BackupManager {
    config: BackupConfig,
    entries: BTreeMap<PathBuf, BackupEntry>,
    created: Vec<PathBuf>,
}

/// A backup manager shared between recovery checkpoints.
pub type SharedBackupManager = Arc<Mutex<BackupManager>>;

impl BackupManager {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            created: Vec::new(),
        }
    }

    /// Wrap the manager for sharing between checkpoint closures.
    pub fn shared(self) -> SharedBackupManager {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Back up a file before it is modified.
    ///
    /// Only the first call for a path copies anything; later calls return
    /// the existing backup. A missing file is recorded so that rollback
    /// deletes it. Returns the backup path, if a copy was made.
    pub fn backup(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(match entry {
                BackupEntry::Copied(record) => Some(record.backup_path.clone()),
                BackupEntry::Absent => None,
            });
        }

        let content = match fs::read(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no file to back up, recording as absent");
                self.entries.insert(path.to_path_buf(), BackupEntry::Absent);
                return Ok(None);
            }
            Err(err) => return Err(backup_error("backup", path, err)),
        };

        let backup_path = self.next_backup_path(path)?;
        fs::write(&backup_path, &content).map_err(|e| backup_error("backup", &backup_path, e))?;

        let record = BackupRecord {
            backup_path: backup_path.clone(),
            checksum: checksum(&content),
            created_at: Utc::now(),
        };
        debug!(
            path = %path.display(),
            backup = %backup_path.display(),
            checksum = %record.checksum,
            "backed up file"
        );
        self.entries
            .insert(path.to_path_buf(), BackupEntry::Copied(record));
        self.created.push(backup_path.clone());
        Ok(Some(backup_path))
    }

    /// The entry recorded for a path.
    pub fn entry(&self, path: &Path) -> Option<&BackupEntry> {
        self.entries.get(path)
    }

    /// Backups created during this run, in creation order.
    pub fn created(&self) -> &[PathBuf] {
        &self.created
    }

    /// Restore one tracked file. Untracked paths are left alone.
    pub fn restore(&self, path: &Path) -> Result<()> {
        match self.entries.get(path) {
            Some(BackupEntry::Copied(record)) => restore(path, record),
            Some(BackupEntry::Absent) => {
                remove_if_exists(path).map_err(|e| backup_error("rollback", path, e))
            }
            None => Ok(()),
        }
    }

    /// Delete the backup of one file and stop tracking it.
    pub fn discard(&mut self, path: &Path) -> Result<()> {
        if let Some(BackupEntry::Copied(record)) = self.entries.remove(path) {
            self.created.retain(|p| *p != record.backup_path);
            remove_if_exists(&record.backup_path)
                .map_err(|e| backup_error("cleanup", &record.backup_path, e))?;
        }
        Ok(())
    }

    /// Restore every tracked file.
    ///
    /// A backup whose content no longer matches its checksum is not
    /// restored. Failures are collected and every file is attempted.
    pub fn rollback(&mut self) -> std::result::Result<(), ErrorList> {
        let mut errors = ErrorList::default();
        for path in self.entries.keys() {
            if let Err(err) = self.restore(path) {
                warn!(path = %path.display(), error = %err, "could not restore file");
                errors.push(err);
            }
        }
        info!(files = self.entries.len(), failures = errors.len(), "rolled back files");
        errors.into_result(())
    }

    /// Delete every backup created during this run and stop tracking.
    pub fn cleanup(&mut self) -> std::result::Result<(), ErrorList> {
        let mut errors = ErrorList::default();
        for backup_path in self.created.drain(..) {
            if let Err(err) = remove_if_exists(&backup_path) {
                errors.push(backup_error("cleanup", &backup_path, err));
            }
        }
        self.entries.clear();
        errors.into_result(())
    }

    /// `<name><suffix>`, or `<name><suffix>.N` when that is already taken.
    fn next_backup_path(&self, path: &Path) -> Result<PathBuf> {
        let file_name = path
            .file_name()
            .ok_or_else(|| {
                MigrationError::backup("path has no file name")
                    .with_file(path.display().to_string())
                    .with_recoverable(false)
            })?
            .to_string_lossy();
        let dir = match &self.config.backup_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| backup_error("backup", dir, e))?;
                dir.clone()
            }
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };

        let base = format!("{}{}", file_name, self.config.suffix);
        let mut candidate = dir.join(&base);
        let mut n = 1;
        while candidate.exists() || self.created.contains(&candidate) {
            candidate = dir.join(format!("{}.{}", base, n));
            n += 1;
        }
        Ok(candidate)
    }
}

fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn restore(path: &Path, record: &BackupRecord) -> Result<()> {
    let content =
        fs::read(&record.backup_path).map_err(|e| backup_error("rollback", &record.backup_path, e))?;
    let actual = checksum(&content);
    if actual != record.checksum {
        return Err(MigrationError::backup("backup content does not match its checksum")
            .with_operation("rollback")
            .with_file(record.backup_path.display().to_string())
            .with_context("expected", &record.checksum)
            .with_context("actual", actual)
            .with_recoverable(false));
    }
    fs::write(path, content).map_err(|e| backup_error("rollback", path, e))?;
    debug!(path = %path.display(), "restored file from backup");
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn backup_error(operation: &str, path: &Path, err: io::Error) -> MigrationError {
    MigrationError::backup(err.to_string())
        .with_operation(operation)
        .with_file(path.display().to_string())
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_backup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.tf");
        fs::write(&file, "original").unwrap();

        let mut manager = BackupManager::default();
        let first = manager.backup(&file).unwrap().unwrap();
        fs::write(&file, "changed").unwrap();
        let second = manager.backup(&file).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.created().len(), 1);
        assert_eq!(fs::read_to_string(&first).unwrap(), "original");
    }

    #[test]
    fn test_rollback_restores_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("terraform.tfstate");
        let original = b"{\n  \"version\": 4\n}\n\xff";
        fs::write(&file, original).unwrap();

        let mut manager = BackupManager::default();
        manager.backup(&file).unwrap();
        fs::write(&file, "rewritten").unwrap();

        manager.rollback().unwrap();
        assert_eq!(fs::read(&file).unwrap(), original.to_vec());
    }

    #[test]
    fn test_absent_file_removed_on_rollback() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("new.tf");

        let mut manager = BackupManager::default();
        assert_eq!(manager.backup(&file).unwrap(), None);
        assert_eq!(manager.entry(&file), Some(&BackupEntry::Absent));

        fs::write(&file, "created").unwrap();
        manager.rollback().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_collision_gets_numbered_suffix() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.tf");
        fs::write(&file, "x").unwrap();
        fs::write(dir.path().join("main.tf.backup"), "stale").unwrap();

        let mut manager = BackupManager::default();
        let backup = manager.backup(&file).unwrap().unwrap();
        assert_eq!(backup, dir.path().join("main.tf.backup.1"));
    }

    #[test]
    fn test_backup_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.tf");
        fs::write(&file, "x").unwrap();

        let config = BackupConfig::default()
            .with_backup_dir(dir.path().join("backups"))
            .with_suffix(".orig");
        let mut manager = BackupManager::new(config);
        let backup = manager.backup(&file).unwrap().unwrap();
        assert_eq!(backup, dir.path().join("backups").join("main.tf.orig"));
    }

    #[test]
    fn test_tampered_backup_not_restored() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.tf");
        fs::write(&file, "original").unwrap();

        let mut manager = BackupManager::default();
        let backup = manager.backup(&file).unwrap().unwrap();
        fs::write(&backup, "tampered").unwrap();
        fs::write(&file, "rewritten").unwrap();

        let errors = manager.rollback().unwrap_err();
        let err = errors.iter().next().unwrap();
        assert_eq!(err.kind, ErrorKind::Backup);
        assert!(!err.is_recoverable());
        assert_eq!(fs::read_to_string(&file).unwrap(), "rewritten");
    }

    #[test]
    fn test_cleanup_tolerates_missing_backups() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.tf");
        fs::write(&file, "x").unwrap();

        let mut manager = BackupManager::default();
        let backup = manager.backup(&file).unwrap().unwrap();
        fs::remove_file(&backup).unwrap();

        manager.cleanup().unwrap();
        assert!(manager.created().is_empty());
        assert_eq!(manager.entry(&file), None);
    }
}
