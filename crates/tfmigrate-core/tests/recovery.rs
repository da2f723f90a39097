//! File rewrites guarded by backup checkpoints.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tfmigrate_core::recovery::{
    backup_checkpoint, BackupConfig, BackupManager, RecoveryConfig, RecoveryStatus, Recoverer,
};
use tfmigrate_core::MigrationError;

fn write_all(dir: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

#[test]
fn test_failed_run_rolls_back_every_file() {
    let dir = TempDir::new().unwrap();
    write_all(dir.path(), &[("a.tf", "a = 1\n"), ("b.tf", "b = 2\n")]);

    let manager = BackupManager::new(BackupConfig::default()).shared();
    let mut recoverer = Recoverer::new(RecoveryConfig::default());

    for name in ["a.tf", "b.tf", "c.tf"] {
        let path = dir.path().join(name);
        recoverer
            .checkpoint(backup_checkpoint(&manager, path.clone()))
            .unwrap();
        let result = recoverer.execute(name, |_| {
            if name == "c.tf" {
                return Err(MigrationError::transform("cannot migrate"));
            }
            fs::write(&path, "rewritten\n").map_err(MigrationError::from)
        });
        if result.is_err() {
            break;
        }
    }
    fs::write(dir.path().join("c.tf"), "partial").unwrap();

    assert_eq!(recoverer.status(), RecoveryStatus::Failed);
    recoverer.rollback().unwrap();
    recoverer.cleanup().unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("a.tf")).unwrap(), "a = 1\n");
    assert_eq!(fs::read_to_string(dir.path().join("b.tf")).unwrap(), "b = 2\n");
    assert!(!dir.path().join("c.tf").exists());
    assert!(!dir.path().join("a.tf.backup").exists());
    assert!(manager.lock().created().is_empty());
}

#[test]
fn test_successful_run_cleans_up_backups() {
    let dir = TempDir::new().unwrap();
    write_all(dir.path(), &[("main.tf", "x = 1\n")]);
    let path = dir.path().join("main.tf");

    let manager = BackupManager::new(BackupConfig::default()).shared();
    let mut recoverer = Recoverer::default();
    recoverer
        .checkpoint(backup_checkpoint(&manager, path.clone()))
        .unwrap();
    assert!(dir.path().join("main.tf.backup").exists());

    recoverer
        .execute("main.tf", |_| fs::write(&path, "x = 2\n").map_err(MigrationError::from))
        .unwrap();
    recoverer.cleanup().unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "x = 2\n");
    assert!(!dir.path().join("main.tf.backup").exists());
}
