//! Recovery: checkpoints, retry policies and file backups.

mod backup;
mod recoverer;

pub use backup::{BackupConfig, BackupEntry, BackupManager, BackupRecord, SharedBackupManager};
pub use recoverer::{
    Deadline, RecoveryConfig, RecoveryPoint, RecoveryStatus, RecoveryStrategy, Recoverer,
};

use std::path::PathBuf;

/// A checkpoint that backs up `path` on save, restores it on rollback and
/// deletes its backup on cleanup.
pub fn backup_checkpoint(manager: &SharedBackupManager, path: PathBuf) -> RecoveryPoint {
    let save_manager = SharedBackupManager::clone(manager);
    let restore_manager = SharedBackupManager::clone(manager);
    let cleanup_manager = SharedBackupManager::clone(manager);
    let name = format!("backup {}", path.display());
    let restore_path = path.clone();
    let cleanup_path = path.clone();

    RecoveryPoint::new(name)
        .on_save(move || save_manager.lock().backup(&path).map(|_| ()))
        .on_restore(move || restore_manager.lock().restore(&restore_path))
        .on_cleanup(move || cleanup_manager.lock().discard(&cleanup_path))
}
