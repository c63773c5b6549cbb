//! Backup records, naming and manifests.

use chrono::{DateTime, NaiveDateTime, Utc};
use ritualdb_core::store::STORE_EXTENSION;
use ritualdb_core::VersionNumber;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Timestamp embedded in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

const TIMESTAMP_PARSE_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";

/// Extension of the manifest sidecar, replacing the store extension.
pub const MANIFEST_EXTENSION: &str = "manifest.json";

/// One snapshot of a store's file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// When the backup was taken, to the microsecond.
    pub created_at: DateTime<Utc>,
    /// Name of the store the backup was taken from.
    pub store_name: String,
    /// Copy of the primary store file.
    pub store_path: PathBuf,
    /// Copies of the companion files that existed at backup time.
    pub companion_paths: Vec<PathBuf>,
    /// Manifest sidecar, if one was written.
    pub manifest_path: Option<PathBuf>,
}

impl BackupRecord {
    /// Every data file of the backup, primary first.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.store_path.as_path())
            .chain(self.companion_paths.iter().map(PathBuf::as_path))
    }

    /// File name of the primary copy.
    pub fn file_name(&self) -> String {
        self.store_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// File name of the primary copy of a backup taken at `at`.
pub fn backup_file_name(store_name: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.{}", store_name, at.format(TIMESTAMP_FORMAT), STORE_EXTENSION)
}

/// Split a backup file name into store name and creation time.
pub fn parse_backup_file_name(file_name: &str) -> Option<(&str, DateTime<Utc>)> {
    let stem = file_name
        .strip_suffix(STORE_EXTENSION)?
        .strip_suffix('.')?;
    let (store, timestamp) = stem.rsplit_once('_')?;
    if store.is_empty() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_PARSE_FORMAT).ok()?;
    Some((store, naive.and_utc()))
}

/// Manifest path next to a backup's primary copy.
pub fn manifest_path_for(store_path: &Path) -> PathBuf {
    store_path.with_extension(MANIFEST_EXTENSION)
}

/// Digest and size of one backed-up file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// File name inside the backup directory.
    pub name: String,
    /// Length in bytes.
    pub len: u64,
    /// Lowercase hex SHA-256 of the contents.
    pub sha256: String,
}

impl ManifestFile {
    /// Describe a file's contents.
    pub fn describe(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            len: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
        }
    }

    /// Check whether contents match this entry.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.len == bytes.len() as u64 && self.sha256 == hex::encode(Sha256::digest(bytes))
    }
}

/// JSON sidecar describing a backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Store the backup was taken from.
    pub store_name: String,
    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
    /// Schema version recorded in the store header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<VersionNumber>,
    /// Checkpoint generation recorded in the store header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    /// Backed-up files, primary first.
    pub files: Vec<ManifestFile>,
}

impl BackupManifest {
    /// Look up a file entry by name.
    pub fn file(&self, name: &str) -> Option<&ManifestFile> {
        self.files.iter().find(|f| f.name == name)
    }
}
