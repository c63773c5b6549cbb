//! Staged schema migrations.
//!
//! This module moves a store between registry versions through a chain of
//! stages, one per pair of adjacent versions:
//! - Automatic schema diffing
//! - Safety grading (A/B/C/D)
//! - Lightweight stages driven by the diff alone
//! - Custom stages with pre and post hooks
//! - Per-stage checkpoints, history and pre-stage snapshots
//!
//! # Safety Grades
//!
//! | Grade | Description | Examples | Stage |
//! |-------|-------------|----------|-------|
//! | **A** | Additive, non-breaking | New optional fields, new entities | Lightweight |
//! | **B** | Backfilled from defaults | New required fields with defaults, int to float | Lightweight |
//! | **C** | Needs a transform | Optional to required without default | Custom |
//! | **D** | Destructive | Field/entity removal, incompatible type changes | Lightweight for removals, otherwise custom |
//!
//! # Example
//!
//! ```ignore
//! use ritualdb_core::migration::{MigrationEngine, StageCatalog};
//!
//! let catalog = Arc::new(StageCatalog::new(&registry, stages)?);
//! let engine = MigrationEngine::new(registry.clone(), catalog).with_logger(logger);
//!
//! let outcome = engine.migrate(&mut store, store.version(), registry.current().version)?;
//! println!("Applied {} stage(s)", outcome.stages.len());
//! ```

mod apply;
pub mod diff;
pub mod engine;
pub mod error;
pub mod grader;
pub mod hooks;
pub mod stage;

// Diff types
pub use diff::{EntityChange, FieldChange, RelationChange, SchemaDiff};

// Error types
pub use error::{MigrationError, SafetyGrade};

// Grader types
pub use grader::{ChangeGrade, MigrationGrade, SafetyGrader};

// Stage types
pub use stage::{MigrationStage, StageCatalog, StageId, StageKind};

// Hook types
pub use hooks::{FnHook, HookError, LegacyData, LegacyValues, MigrationHook, StageContext};

// Engine types
pub use engine::{
    AppliedStage, MigrationConfig, MigrationEngine, MigrationOutcome, MigrationSafetyNet,
};
