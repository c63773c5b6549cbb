//! Backup configuration.

/// Default number of backups kept per store.
pub const DEFAULT_RETENTION: usize = 3;

/// Default name of the backup directory, relative to the store directory.
pub const DEFAULT_DIRECTORY: &str = "Backups";

/// Configuration for where backups live and how many are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Keep at most this many backups per store. Never less than one.
    pub retention: usize,

    /// Backup directory name, created next to the store files.
    pub directory: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            directory: DEFAULT_DIRECTORY.to_string(),
        }
    }
}

impl BackupConfig {
    /// Create a configuration with a retention cap.
    pub fn with_retention(retention: usize) -> Self {
        Self::default().retention(retention)
    }

    /// Set the retention cap.
    pub fn retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Set the backup directory name.
    pub fn directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }
}
