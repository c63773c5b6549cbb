//! Backup manager.
//!
//! All file set I/O and every read-modify-write of the pending-restore flag
//! runs under one mutex per manager.

use crate::config::BackupConfig;
use crate::error::{BackupError, RestoreError};
use crate::record::{
    backup_file_name, manifest_path_for, parse_backup_file_name, BackupManifest, BackupRecord,
    ManifestFile,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use ritualdb_core::migration::{HookError, MigrationSafetyNet, MigrationStage};
use ritualdb_core::port::{pending_restore_key, remove_if_exists, FileSystem, KeyValueStore};
use ritualdb_core::store::{companion_of, RecordStore, StoreLocation, COMPANION_SUFFIXES};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates, prunes and restores snapshots of one store.
#[derive(Debug)]
pub struct BackupManager {
    fs: Arc<dyn FileSystem>,
    kv: Arc<dyn KeyValueStore>,
    location: StoreLocation,
    config: BackupConfig,
    io: Mutex<()>,
}

impl BackupManager {
    /// Create a manager for the store at `location`.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        kv: Arc<dyn KeyValueStore>,
        location: StoreLocation,
        config: BackupConfig,
    ) -> Self {
        Self {
            fs,
            kv,
            location,
            config,
            io: Mutex::new(()),
        }
    }

    /// Location of the store being backed up.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Configuration in effect.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Directory holding the backups.
    pub fn backup_directory(&self) -> PathBuf {
        self.location.directory().join(&self.config.directory)
    }

    /// Copy the store's files into a new timestamped backup, then prune old
    /// backups.
    ///
    /// Copies what is on disk; checkpoint an open store first to capture its
    /// latest state in the primary file.
    pub fn create_backup(&self) -> Result<BackupRecord, BackupError> {
        let _guard = self.io.lock();

        let primary = self.location.primary_path();
        if !self.fs.exists(&primary) {
            return Err(BackupError::DatabaseNotFound(primary));
        }
        let directory = self.backup_directory();
        self.fs.create_dir_all(&directory)?;

        let created_at = self.next_timestamp()?;
        let store_path = directory.join(backup_file_name(self.location.name(), created_at));

        let mut files = vec![self.copy_file(&primary, &store_path)?];
        let mut companion_paths = Vec::new();
        for suffix in COMPANION_SUFFIXES {
            let source = companion_of(&primary, suffix);
            if !self.fs.exists(&source) {
                continue;
            }
            let target = companion_of(&store_path, suffix);
            files.push(self.copy_file(&source, &target)?);
            companion_paths.push(target);
        }

        let info = match RecordStore::inspect(self.fs.as_ref(), &self.location) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(error = %e, "Backup taken without header details");
                None
            }
        };
        let manifest = BackupManifest {
            store_name: self.location.name().to_string(),
            created_at,
            schema_version: info.as_ref().map(|i| i.version),
            generation: info.as_ref().map(|i| i.generation),
            files,
        };
        let manifest_path = manifest_path_for(&store_path);
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| BackupError::Manifest(e.to_string()))?;
        self.fs.write(&manifest_path, &bytes)?;

        let record = BackupRecord {
            created_at,
            store_name: self.location.name().to_string(),
            store_path,
            companion_paths,
            manifest_path: Some(manifest_path),
        };
        info!(
            path = %record.store_path.display(),
            files = record.companion_paths.len() + 1,
            "Created backup"
        );

        if let Err(e) = self.cleanup_locked() {
            warn!(error = %e, "Failed to prune old backups");
        }
        Ok(record)
    }

    /// Delete all but the most recent backups, up to the retention cap.
    ///
    /// Returns how many backups were deleted.
    pub fn cleanup_old_backups(&self) -> Result<usize, BackupError> {
        let _guard = self.io.lock();
        self.cleanup_locked()
    }

    /// Backups of this store, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>, BackupError> {
        let _guard = self.io.lock();
        Ok(self.scan()?)
    }

    /// Replace the store's files with a backup's.
    ///
    /// Not transactional across files: an I/O error part way through leaves
    /// the store with a mix of old and restored files.
    pub fn restore(&self, record: &BackupRecord) -> Result<(), RestoreError> {
        let _guard = self.io.lock();
        self.restore_locked(record)
    }

    /// Restore the newest backup.
    pub fn restore_latest_backup(&self) -> Result<BackupRecord, RestoreError> {
        let _guard = self.io.lock();
        let latest = self
            .scan()?
            .into_iter()
            .next()
            .ok_or(RestoreError::NoBackupAvailable)?;
        self.restore_locked(&latest)?;
        Ok(latest)
    }

    /// Resolve a path to a backup of this store into a record.
    pub fn record_at(&self, path: &Path) -> Result<BackupRecord, RestoreError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RestoreError::NotABackup(path.to_path_buf()))?;
        let (store_name, created_at) = parse_backup_file_name(file_name)
            .ok_or_else(|| RestoreError::NotABackup(path.to_path_buf()))?;
        if let Some((expected, found)) = self.foreign(store_name) {
            return Err(RestoreError::WrongStore { expected, found });
        }
        if !self.fs.exists(path) {
            return Err(RestoreError::BackupMissing(path.to_path_buf()));
        }
        Ok(self.record_for(store_name, created_at, path.to_path_buf()))
    }

    /// Durably request that `record` be restored before the store is next
    /// opened. Replaces any earlier request.
    pub fn schedule_pending_restore(&self, record: &BackupRecord) -> Result<(), BackupError> {
        let _guard = self.io.lock();
        if let Some((expected, found)) = self.foreign(&record.store_name) {
            return Err(BackupError::WrongStore { expected, found });
        }
        if !self.fs.exists(&record.store_path) {
            return Err(BackupError::BackupMissing(record.store_path.clone()));
        }
        self.kv.set_string(
            &pending_restore_key(self.location.name()),
            &record.store_path.to_string_lossy(),
        )?;
        info!(path = %record.store_path.display(), "Scheduled pending restore");
        Ok(())
    }

    /// The backup a pending restore points at, if one is scheduled.
    pub fn pending_restore(&self) -> Result<Option<PathBuf>, BackupError> {
        let _guard = self.io.lock();
        Ok(self.pending_locked()?)
    }

    /// Drop a scheduled restore. Returns whether one was scheduled.
    pub fn cancel_pending_restore(&self) -> Result<bool, BackupError> {
        let _guard = self.io.lock();
        let removed = self
            .kv
            .remove(&pending_restore_key(self.location.name()))?;
        if removed {
            info!(store = self.location.name(), "Cancelled pending restore");
        }
        Ok(removed)
    }

    /// Perform a scheduled restore, if any, and clear the flag.
    ///
    /// Must run before the store is opened. The flag is cleared whether the
    /// restore succeeds or fails, unless the store is open, so a broken
    /// backup is never retried forever.
    pub fn execute_pending_restore_if_needed(&self) -> Result<Option<BackupRecord>, RestoreError> {
        let _guard = self.io.lock();
        let Some(path) = self.pending_locked()? else {
            return Ok(None);
        };
        let key = pending_restore_key(self.location.name());
        info!(path = %path.display(), "Executing pending restore");

        let result = self.record_at(&path).and_then(|record| {
            self.restore_locked(&record)?;
            Ok(record)
        });
        match &result {
            Err(RestoreError::StoreOpen(_)) => {}
            Err(e) => {
                self.kv.remove(&key)?;
                warn!(path = %path.display(), error = %e, "Pending restore failed, flag cleared");
            }
            Ok(_) => {
                self.kv.remove(&key)?;
            }
        }
        result.map(Some)
    }

    /// Delete every backup of this store. A pending restore, which would now
    /// point at nothing, is cancelled too.
    pub fn delete_all_backups(&self) -> Result<usize, BackupError> {
        let _guard = self.io.lock();
        let records = self.scan()?;
        for record in &records {
            self.delete_record(record)?;
        }
        if self
            .kv
            .remove(&pending_restore_key(self.location.name()))?
        {
            debug!("Cancelled pending restore with its backup");
        }
        info!(deleted = records.len(), "Deleted all backups");
        Ok(records.len())
    }

    fn cleanup_locked(&self) -> Result<usize, BackupError> {
        let records = self.scan()?;
        let stale = records.len().saturating_sub(self.config.retention);
        for record in records.iter().skip(self.config.retention) {
            self.delete_record(record)?;
        }
        if stale > 0 {
            debug!(deleted = stale, kept = self.config.retention, "Pruned old backups");
        }
        Ok(stale)
    }

    /// Backups of this store, newest first.
    fn scan(&self) -> io::Result<Vec<BackupRecord>> {
        let files = match self.fs.list_dir(&self.backup_directory()) {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut records: Vec<BackupRecord> = files
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let (store_name, created_at) = parse_backup_file_name(name)?;
                (store_name == self.location.name())
                    .then(|| self.record_for(store_name, created_at, path.clone()))
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn record_for(
        &self,
        store_name: &str,
        created_at: DateTime<Utc>,
        store_path: PathBuf,
    ) -> BackupRecord {
        let companion_paths = COMPANION_SUFFIXES
            .iter()
            .map(|suffix| companion_of(&store_path, suffix))
            .filter(|path| self.fs.exists(path))
            .collect();
        let manifest = manifest_path_for(&store_path);
        let manifest_path = self.fs.exists(&manifest).then_some(manifest);
        BackupRecord {
            created_at,
            store_name: store_name.to_string(),
            store_path,
            companion_paths,
            manifest_path,
        }
    }

    fn restore_locked(&self, record: &BackupRecord) -> Result<(), RestoreError> {
        if let Some((expected, found)) = self.foreign(&record.store_name) {
            return Err(RestoreError::WrongStore { expected, found });
        }
        if !self.fs.exists(&record.store_path) {
            return Err(RestoreError::BackupMissing(record.store_path.clone()));
        }
        let primary = self.location.primary_path();
        if self.fs.is_locked(&primary) {
            return Err(RestoreError::StoreOpen(primary));
        }
        if let Some(manifest_path) = &record.manifest_path {
            self.verify(record, manifest_path)?;
        }

        remove_if_exists(self.fs.as_ref(), &primary)?;
        for companion in self.location.companion_paths() {
            remove_if_exists(self.fs.as_ref(), &companion)?;
        }

        self.fs.copy(&record.store_path, &primary)?;
        for suffix in COMPANION_SUFFIXES {
            let source = companion_of(&record.store_path, suffix);
            if self.fs.exists(&source) {
                self.fs.copy(&source, &companion_of(&primary, suffix))?;
            }
        }

        info!(
            from = %record.store_path.display(),
            to = %primary.display(),
            "Restored backup"
        );
        Ok(())
    }

    /// `(expected, found)` when `store_name` is not this manager's store.
    fn foreign(&self, store_name: &str) -> Option<(String, String)> {
        (store_name != self.location.name())
            .then(|| (self.location.name().to_string(), store_name.to_string()))
    }

    fn verify(&self, record: &BackupRecord, manifest_path: &Path) -> Result<(), RestoreError> {
        let bytes = self.fs.read(manifest_path)?;
        let manifest: BackupManifest =
            serde_json::from_slice(&bytes).map_err(|e| RestoreError::Manifest(e.to_string()))?;

        for path in record.files() {
            let name = file_name_of(path);
            let contents = self.fs.read(path)?;
            let matches = manifest
                .file(&name)
                .is_some_and(|entry| entry.matches(&contents));
            if !matches {
                return Err(RestoreError::ChecksumMismatch {
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    fn delete_record(&self, record: &BackupRecord) -> io::Result<()> {
        for path in record.files() {
            remove_if_exists(self.fs.as_ref(), path)?;
        }
        remove_if_exists(self.fs.as_ref(), &manifest_path_for(&record.store_path))?;
        debug!(path = %record.store_path.display(), "Deleted backup");
        Ok(())
    }

    fn pending_locked(&self) -> Result<Option<PathBuf>, ritualdb_core::Error> {
        Ok(self
            .kv
            .get_string(&pending_restore_key(self.location.name()))?
            .map(PathBuf::from))
    }

    fn copy_file(&self, source: &Path, target: &Path) -> io::Result<ManifestFile> {
        let bytes = self.fs.read(source)?;
        self.fs.write(target, &bytes)?;
        Ok(ManifestFile::describe(file_name_of(target), &bytes))
    }

    /// Current time at microsecond precision, later than every existing
    /// backup of this store.
    fn next_timestamp(&self) -> io::Result<DateTime<Utc>> {
        let now = Utc::now();
        let now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
        Ok(match self.scan()?.first() {
            Some(newest) if newest.created_at >= now => {
                newest.created_at + Duration::microseconds(1)
            }
            _ => now,
        })
    }
}

impl MigrationSafetyNet for BackupManager {
    fn snapshot_before(
        &self,
        store: &RecordStore,
        stage: &MigrationStage,
    ) -> Result<PathBuf, HookError> {
        if store.location() != &self.location {
            return Err(format!(
                "backup manager for {} cannot snapshot {}",
                self.location.primary_path().display(),
                store.location().primary_path().display()
            )
            .into());
        }
        let record = self.create_backup()?;
        debug!(stage = %stage.id(), path = %record.store_path.display(), "Pre-stage snapshot");
        Ok(record.store_path)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
