//! RitualDB Backup - Snapshots of record stores.
//!
//! A [`BackupManager`] copies a store's primary file and its companions into
//! a `Backups/` directory under a timestamped name, keeps only the most
//! recent snapshots, restores them, and carries the durable pending-restore
//! flag that must be honored before the store is next opened.

pub mod config;
pub mod error;
pub mod manager;
pub mod record;

pub use config::BackupConfig;
pub use error::{BackupError, RestoreError};
pub use manager::BackupManager;
pub use record::{BackupManifest, BackupRecord, ManifestFile};
