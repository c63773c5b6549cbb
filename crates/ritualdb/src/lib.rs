//! RitualDB - On-device stores that survive every schema release.
//!
//! The [`PersistentStoreContainer`] is the startup entry point. It honors a
//! pending restore, opens the shared and private stores, walks them through
//! any migration stages between their on-disk version and the current one,
//! and hands back the opened handles.
//!
//! # Example
//!
//! ```no_run
//! use ritualdb::{PersistentStoreContainer, StoreConfig};
//!
//! let config = StoreConfig::new("./data").with_sync(false);
//! let container = PersistentStoreContainer::for_application(config)?;
//! let stores = container.open()?;
//! println!("shared store at {}", stores.shared.version());
//! # Ok::<(), ritualdb::ContainerError>(())
//! ```

mod config;
mod container;
mod error;
mod state;

pub use config::{StoreConfig, DEFAULT_BACKUP_RETENTION};
pub use container::{OpenedStores, PendingResolved, PersistentStoreContainer, StoreStatus};
pub use error::{ContainerError, RestoreOutcome};
pub use state::ContainerState;

// Re-export commonly used types
pub use ritualdb_backup::{BackupConfig, BackupManager, BackupRecord};
pub use ritualdb_core::{
    MigrationLogger, MigrationOutcome, RecordStore, Row, SchemaRegistry, StageCatalog, StoreRole,
    Tier, TierConfigurator, Value, VersionNumber,
};
