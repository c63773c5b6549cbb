//! Key-value persistence port.

use crate::error::Error;
use parking_lot::Mutex;
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::Path;

/// Tree name for durable settings.
const SETTINGS_TREE: &str = "settings";

/// Key prefix for the last schema version a store was opened at.
pub const LAST_VERSION_PREFIX: &str = "schema.last_version.";

/// Key prefix for a store's pending-restore flag.
pub const PENDING_RESTORE_PREFIX: &str = "backup.pending_restore.";

/// Key of the migration event history.
pub const MIGRATION_HISTORY_KEY: &str = "migration.history";

/// Key holding the last schema version a store was opened at.
pub fn last_version_key(store: &str) -> String {
    format!("{}{}", LAST_VERSION_PREFIX, store)
}

/// Key holding a store's pending-restore flag.
pub fn pending_restore_key(store: &str) -> String {
    format!("{}{}", PENDING_RESTORE_PREFIX, store)
}

/// Durable key-value settings.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Get a value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Set a value durably.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), Error>;

    /// Remove a value. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, Error>;

    /// Get a UTF-8 value.
    fn get_string(&self, key: &str) -> Result<Option<String>, Error> {
        match self.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| Error::InvalidData(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Set a UTF-8 value.
    fn set_string(&self, key: &str, value: &str) -> Result<(), Error> {
        self.set(key, value.as_bytes())
    }
}

/// Key-value store backed by a sled tree.
#[derive(Debug, Clone)]
pub struct SledKeyValueStore {
    tree: Tree,
}

impl SledKeyValueStore {
    /// Open the settings tree of an existing sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        Ok(Self {
            tree: db.open_tree(SETTINGS_TREE)?,
        })
    }

    /// Open or create a sled database at `path` and use its settings tree.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = sled::open(path)?;
        Self::open(&db)
    }
}

impl KeyValueStore for SledKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.tree.insert(key, value)?;
        self.tree.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, Error> {
        let existed = self.tree.remove(key)?.is_some();
        self.tree.flush()?;
        Ok(existed)
    }
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently set.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}
