//! Store configuration.

use ritualdb_backup::BackupConfig;
use ritualdb_core::app::{PRIVATE_STORE_NAME, SHARED_STORE_NAME};
use std::path::PathBuf;

/// Default number of backups kept per store.
pub const DEFAULT_BACKUP_RETENTION: usize = 3;

/// Name of the settings database inside the data directory.
pub const SETTINGS_DIR: &str = "settings";

/// RitualDB store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory shared by the stores, their backups and the settings.
    pub data_dir: PathBuf,

    /// Name of the sync-capable store. Independent of sync availability.
    pub shared_store_name: String,

    /// Name of the never-synced store.
    pub private_store_name: String,

    /// Backups kept per store.
    pub backup_retention: usize,

    /// Whether the sync backend is available this run.
    pub sync_available: bool,

    /// Restore the newest backup after a failed migration stage.
    pub auto_restore: bool,

    /// Snapshot a store before each custom stage.
    pub snapshot_before_custom_stages: bool,
}

impl StoreConfig {
    /// Create a configuration rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            shared_store_name: SHARED_STORE_NAME.to_string(),
            private_store_name: PRIVATE_STORE_NAME.to_string(),
            backup_retention: DEFAULT_BACKUP_RETENTION,
            sync_available: false,
            auto_restore: true,
            snapshot_before_custom_stages: true,
        }
    }

    /// Set the shared store name.
    pub fn with_shared_store_name(mut self, name: impl Into<String>) -> Self {
        self.shared_store_name = name.into();
        self
    }

    /// Set the private store name.
    pub fn with_private_store_name(mut self, name: impl Into<String>) -> Self {
        self.private_store_name = name.into();
        self
    }

    /// Set the number of backups kept per store.
    pub fn with_backup_retention(mut self, retention: usize) -> Self {
        self.backup_retention = retention.max(1);
        self
    }

    /// Set whether sync is available.
    pub fn with_sync(mut self, available: bool) -> Self {
        self.sync_available = available;
        self
    }

    /// Set whether to restore automatically after a failed migration.
    pub fn with_auto_restore(mut self, enabled: bool) -> Self {
        self.auto_restore = enabled;
        self
    }

    /// Set whether to snapshot before custom stages.
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.snapshot_before_custom_stages = enabled;
        self
    }

    /// Path of the settings database.
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_DIR)
    }

    /// Backup configuration derived from this one.
    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig::with_retention(self.backup_retention)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.shared_store_name, "Ritualist");
        assert_eq!(config.private_store_name, "Private");
        assert_eq!(config.backup_retention, 3);
        assert!(!config.sync_available);
        assert!(config.auto_restore);
        assert!(config.snapshot_before_custom_stages);
        assert_eq!(config.settings_path(), PathBuf::from("./data/settings"));
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new("/tmp/ritual")
            .with_sync(true)
            .with_backup_retention(0)
            .with_auto_restore(false)
            .with_shared_store_name("Main");
        assert!(config.sync_available);
        assert_eq!(config.backup_retention, 1);
        assert!(!config.auto_restore);
        assert_eq!(config.shared_store_name, "Main");
        assert_eq!(config.backup_config().retention, 1);
    }
}
