//! RitualDB Core - Schema registry, staged migrations, and record store.
//!
//! This crate provides the versioned-schema engine behind RitualDB: the
//! registry of schema versions, the stage catalog and migration engine that
//! walk a store between them, the migration history, and the tier rules
//! that keep local-only entities on the device.

pub mod app;
pub mod catalog;
pub mod error;
pub mod history;
pub mod migration;
pub mod port;
pub mod registry;
pub mod store;
pub mod tier;

pub use catalog::{
    Cardinality, DefaultValue, DeleteRule, EntityShape, FieldDef, FieldType, RelationDef,
    ScalarType, SchemaVersion, StructuralChecksum, VersionNumber,
};
pub use error::Error;
pub use history::{MigrationEvent, MigrationLogger, MigrationStatistics, MigrationStatus};
pub use migration::{
    FnHook, MigrationConfig, MigrationEngine, MigrationError, MigrationHook, MigrationOutcome,
    MigrationSafetyNet, MigrationStage, SafetyGrade, SafetyGrader, SchemaDiff, StageCatalog,
    StageContext,
};
pub use port::{
    FileSystem, KeyValueStore, MemoryFileSystem, MemoryKeyValueStore, OsFileSystem,
    SledKeyValueStore,
};
pub use registry::{RegistryError, SchemaChange, SchemaRegistry, VersionStep};
pub use store::{Hosting, RecordStore, Row, RowId, StoreLocation, Value};
pub use tier::{StoreLayout, StorePlan, StoreRole, Tier, TierConfigurator, TierPolicy};
