//! Ports to the on-device environment.
//!
//! Everything the engine persists outside its record stores goes through
//! these two traits, so tests can run against in-memory implementations.

mod fs;
mod kv;

pub use fs::{remove_if_exists, FileSystem, MemoryFileSystem, OsFileSystem};
pub use kv::{
    last_version_key, pending_restore_key, KeyValueStore, MemoryKeyValueStore, SledKeyValueStore,
    LAST_VERSION_PREFIX, MIGRATION_HISTORY_KEY, PENDING_RESTORE_PREFIX,
};
