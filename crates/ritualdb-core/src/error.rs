//! Core error types.

use std::path::PathBuf;
use thiserror::Error;

/// Storage and port level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// File system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Key-value store error.
    #[error("key-value store error: {0}")]
    KeyValue(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// No store exists at the given primary path.
    #[error("store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    /// A store already exists at the given primary path.
    #[error("store already exists: {}", .0.display())]
    StoreExists(PathBuf),

    /// The store is held open by another handle.
    #[error("store is already open: {}", .0.display())]
    StoreLocked(PathBuf),

    /// The entity is not hosted by this store.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Record not found.
    #[error("record not found: {entity}/{id}")]
    RecordNotFound {
        /// Entity name.
        entity: String,
        /// Hex-encoded row id.
        id: String,
    },
}
