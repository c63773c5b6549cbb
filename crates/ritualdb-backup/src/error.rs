//! Backup and restore error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from creating, listing or deleting backups.
#[derive(Debug, Error)]
pub enum BackupError {
    /// There is no store file to back up.
    #[error("database not found: {}", .0.display())]
    DatabaseNotFound(PathBuf),

    /// A backup referenced by path does not exist.
    #[error("backup not found: {}", .0.display())]
    BackupMissing(PathBuf),

    /// The backup belongs to a different store.
    #[error("backup of {found} cannot be used for store {expected}")]
    WrongStore {
        /// Store this manager serves.
        expected: String,
        /// Store the backup was taken from.
        found: String,
    },

    /// File system error.
    #[error("backup io error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest could not be written or read.
    #[error("backup manifest error: {0}")]
    Manifest(String),

    /// Key-value store error.
    #[error(transparent)]
    Storage(#[from] ritualdb_core::Error),
}

/// Errors from restoring a backup.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// There is no backup to restore.
    #[error("no backup available")]
    NoBackupAvailable,

    /// The backup file set is gone.
    #[error("backup not found: {}", .0.display())]
    BackupMissing(PathBuf),

    /// The path does not name a backup.
    #[error("not a backup file: {}", .0.display())]
    NotABackup(PathBuf),

    /// The backup belongs to a different store.
    #[error("backup of {found} cannot be restored over store {expected}")]
    WrongStore {
        /// Store this manager serves.
        expected: String,
        /// Store the backup was taken from.
        found: String,
    },

    /// The target store is open in this process.
    #[error("store is open, restore must run before it is opened: {}", .0.display())]
    StoreOpen(PathBuf),

    /// A backup file does not match its manifest digest.
    #[error("checksum mismatch for {}", .path.display())]
    ChecksumMismatch {
        /// File whose contents changed.
        path: PathBuf,
    },

    /// The manifest could not be read.
    #[error("backup manifest error: {0}")]
    Manifest(String),

    /// File system error, possibly after some files were replaced.
    #[error("restore io error: {0}")]
    Io(#[from] std::io::Error),

    /// Key-value store error.
    #[error(transparent)]
    Storage(#[from] ritualdb_core::Error),
}
