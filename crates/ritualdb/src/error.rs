//! Container error types.

use ritualdb_backup::{BackupError, RestoreError};
use ritualdb_core::MigrationError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What happened to the automatic restore after a failed migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No restore was attempted.
    NotAttempted,
    /// The newest backup was restored.
    Restored(PathBuf),
    /// The restore itself failed.
    Failed(String),
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreOutcome::NotAttempted => write!(f, "no restore attempted"),
            RestoreOutcome::Restored(path) => write!(f, "restored {}", path.display()),
            RestoreOutcome::Failed(reason) => write!(f, "restore failed: {}", reason),
        }
    }
}

/// Startup errors. None of them leave a usable store behind.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container could not be set up or a store could not be opened.
    #[error("container initialization failed: {message}")]
    ContainerInitializationFailed {
        /// What was being done.
        message: String,
        /// Underlying storage error.
        #[source]
        source: Option<ritualdb_core::Error>,
    },

    /// A migration stage failed.
    #[error("migration failed: {source} ({restore})")]
    MigrationFailed {
        /// Engine error.
        #[source]
        source: MigrationError,
        /// Outcome of the automatic restore.
        restore: RestoreOutcome,
    },

    /// Creating or managing a backup failed.
    #[error("backup failed: {0}")]
    BackupFailed(#[from] BackupError),

    /// Restoring a backup failed.
    #[error("restore failed: {0}")]
    RestoreFailed(#[from] RestoreError),
}

impl ContainerError {
    pub(crate) fn init(message: impl Into<String>, source: ritualdb_core::Error) -> Self {
        ContainerError::ContainerInitializationFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ContainerError::ContainerInitializationFailed {
            message: message.into(),
            source: None,
        }
    }
}
