//! Migration engine.
//!
//! Walks the stage chain between two registry versions, one stage at a time.
//! Each stage is audited, applied, validated and checkpointed before the
//! next one starts, so a failure leaves the store at the last completed
//! stage.

use super::apply::{apply_diff, validate_rows, ApplyMode};
use super::diff::SchemaDiff;
use super::error::{MigrationError, SafetyGrade};
use super::grader::SafetyGrader;
use super::hooks::{HookError, LegacyData, MigrationHook, StageContext};
use super::stage::{MigrationStage, StageCatalog, StageId, StageKind};
use crate::catalog::VersionNumber;
use crate::error::Error;
use crate::history::MigrationLogger;
use crate::registry::SchemaRegistry;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Takes a snapshot of a store before a custom stage runs.
pub trait MigrationSafetyNet: Send + Sync {
    /// Snapshot the checkpointed store; returns where the snapshot lives.
    fn snapshot_before(
        &self,
        store: &RecordStore,
        stage: &MigrationStage,
    ) -> Result<PathBuf, HookError>;
}

/// Migration engine configuration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Snapshot through the safety net before every custom stage.
    pub snapshot_before_custom_stages: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            snapshot_before_custom_stages: true,
        }
    }
}

/// One stage the engine completed.
#[derive(Debug, Clone)]
pub struct AppliedStage {
    /// The stage.
    pub stage: StageId,
    /// Whether hooks ran.
    pub custom: bool,
    /// Safety grade of the stage's change.
    pub grade: SafetyGrade,
    /// Wall-clock duration.
    pub duration_ms: i64,
    /// Snapshot taken before the stage.
    pub snapshot: Option<PathBuf>,
}

/// Result of a completed migration.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// Version the store started at.
    pub from: VersionNumber,
    /// Version the store is at now.
    pub to: VersionNumber,
    /// Completed stages in order.
    pub stages: Vec<AppliedStage>,
    /// Total wall-clock duration.
    pub duration_ms: i64,
}

impl MigrationOutcome {
    /// Check if no stage ran.
    pub fn is_noop(&self) -> bool {
        self.stages.is_empty()
    }

    /// Snapshots taken during the migration.
    pub fn snapshots(&self) -> Vec<&Path> {
        self.stages
            .iter()
            .filter_map(|s| s.snapshot.as_deref())
            .collect()
    }
}

/// Runs stages from a registry's stage catalog against a store.
pub struct MigrationEngine {
    registry: Arc<SchemaRegistry>,
    catalog: Arc<StageCatalog>,
    logger: Option<Arc<MigrationLogger>>,
    safety_net: Option<Arc<dyn MigrationSafetyNet>>,
    config: MigrationConfig,
}

impl MigrationEngine {
    /// Create an engine without history or snapshots.
    pub fn new(registry: Arc<SchemaRegistry>, catalog: Arc<StageCatalog>) -> Self {
        Self {
            registry,
            catalog,
            logger: None,
            safety_net: None,
            config: MigrationConfig::default(),
        }
    }

    /// Record every stage attempt.
    pub fn with_logger(mut self, logger: Arc<MigrationLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Snapshot before custom stages.
    pub fn with_safety_net(mut self, safety_net: Arc<dyn MigrationSafetyNet>) -> Self {
        self.safety_net = Some(safety_net);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry stages are computed against.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Migrate a store from `from` to `to`.
    ///
    /// The store must be formatted for `from` with exactly the shape the
    /// registry records for it. Migrating to the same version is a no-op.
    pub fn migrate(
        &self,
        store: &mut RecordStore,
        from: VersionNumber,
        to: VersionNumber,
    ) -> Result<MigrationOutcome, MigrationError> {
        let expected = self
            .registry
            .checksum(from)
            .ok_or(MigrationError::UnknownVersion(from))?;
        if self.registry.get(to).is_none() {
            return Err(MigrationError::UnknownVersion(to));
        }
        if store.version() != from {
            return Err(MigrationError::SchemaMismatch {
                version: from,
                message: format!("store is formatted for {}", store.version()),
            });
        }
        if store.checksum() != expected {
            return Err(MigrationError::SchemaMismatch {
                version: from,
                message: format!(
                    "store checksum {} differs from registry checksum {}",
                    store.checksum().short(),
                    expected.short()
                ),
            });
        }

        let path = self.catalog.path(from, to)?;
        let started = Utc::now();
        let mut outcome = MigrationOutcome {
            from,
            to,
            stages: Vec::with_capacity(path.len()),
            duration_ms: 0,
        };
        if path.is_empty() {
            debug!(version = %from, "Store is up to date");
            return Ok(outcome);
        }

        info!(
            from_version = %from,
            to_version = %to,
            stages = path.len(),
            "Starting migration"
        );

        let mut snapshots = Vec::new();
        for (completed, stage) in path.into_iter().enumerate() {
            match self.run_stage(store, stage, &mut snapshots) {
                Ok(applied) => outcome.stages.push(applied),
                Err(source) => {
                    error!(
                        from_version = %from,
                        to_version = %to,
                        stage = %stage.id(),
                        completed,
                        error = %source,
                        "Migration failed"
                    );
                    return Err(MigrationError::MigrationFailed {
                        from,
                        to,
                        failed_stage: stage.id(),
                        completed,
                        snapshots,
                        source: Box::new(source),
                    });
                }
            }
        }

        outcome.duration_ms = elapsed_ms(started);
        info!(
            from_version = %from,
            to_version = %to,
            duration_ms = outcome.duration_ms,
            "Migration complete"
        );
        Ok(outcome)
    }

    fn run_stage(
        &self,
        store: &mut RecordStore,
        stage: &MigrationStage,
        snapshots: &mut Vec<PathBuf>,
    ) -> Result<AppliedStage, MigrationError> {
        let id = stage.id();
        let store_name = store.location().name().to_string();
        let started_at = Utc::now();
        let description = self
            .registry
            .step_to(stage.to)
            .map(|s| s.description.clone());

        self.audit(|logger| {
            logger
                .log_start(&store_name, id.from, id.to, started_at, description.clone())
                .map(drop)
        });

        let result = self.apply_stage(store, stage, started_at, snapshots);

        match &result {
            Ok(applied) => {
                info!(
                    stage = %id,
                    grade = %applied.grade,
                    duration_ms = applied.duration_ms,
                    "Stage complete"
                );
                self.audit(|logger| {
                    logger
                        .log_success(&store_name, id.from, id.to, started_at, description.clone())
                        .map(drop)
                });
            }
            Err(e) => {
                let message = e.to_string();
                self.audit(|logger| {
                    logger
                        .log_failure(
                            &store_name,
                            id.from,
                            id.to,
                            started_at,
                            &message,
                            description.clone(),
                        )
                        .map(drop)
                });
            }
        }
        result
    }

    fn apply_stage(
        &self,
        store: &mut RecordStore,
        stage: &MigrationStage,
        started_at: DateTime<Utc>,
        snapshots: &mut Vec<PathBuf>,
    ) -> Result<AppliedStage, MigrationError> {
        let id = stage.id();
        let source = self
            .registry
            .get(stage.from)
            .ok_or(MigrationError::UnknownVersion(stage.from))?;
        let target = self
            .registry
            .get(stage.to)
            .ok_or(MigrationError::UnknownVersion(stage.to))?;

        let diff = SchemaDiff::compute(source, target);
        let grade = SafetyGrader::grade(&diff);
        for warning in &grade.warnings {
            debug!(stage = %id, "{}", warning);
        }

        let mut snapshot = None;
        match &stage.kind {
            StageKind::Lightweight => {
                apply_diff(store, &diff, target, id, ApplyMode::Lightweight)?;
            }
            StageKind::Custom { pre, post } => {
                if self.config.snapshot_before_custom_stages {
                    snapshot = self.snapshot(store, stage);
                    snapshots.extend(snapshot.clone());
                }
                if let Some(hook) = pre {
                    run_hook(hook.as_ref(), store, id, &LegacyData::default())?;
                }
                let legacy = apply_diff(store, &diff, target, id, ApplyMode::Custom)?;
                if let Some(hook) = post {
                    run_hook(hook.as_ref(), store, id, &legacy)?;
                }
                if !legacy.is_empty() {
                    debug!(stage = %id, retired = legacy.len(), "Discarding retired values");
                }
            }
        }

        validate_rows(store, target)?;
        store.checkpoint()?;

        Ok(AppliedStage {
            stage: id,
            custom: stage.is_custom(),
            grade: grade.overall_grade,
            duration_ms: elapsed_ms(started_at),
            snapshot,
        })
    }

    fn snapshot(&self, store: &mut RecordStore, stage: &MigrationStage) -> Option<PathBuf> {
        let safety_net = self.safety_net.as_ref()?;

        if let Err(e) = store.checkpoint() {
            warn!(stage = %stage.id(), error = %e, "Cannot checkpoint before snapshot; continuing without one");
            return None;
        }
        match safety_net.snapshot_before(store, stage) {
            Ok(path) => {
                info!(stage = %stage.id(), path = %path.display(), "Took pre-migration snapshot");
                Some(path)
            }
            Err(e) => {
                warn!(stage = %stage.id(), error = %e, "Pre-migration snapshot failed; continuing without one");
                None
            }
        }
    }

    fn audit(&self, record: impl FnOnce(&MigrationLogger) -> Result<(), Error>) {
        if let Some(logger) = &self.logger {
            if let Err(e) = record(logger) {
                warn!(error = %e, "Failed to record migration event");
            }
        }
    }
}

fn run_hook(
    hook: &dyn MigrationHook,
    store: &mut RecordStore,
    stage: StageId,
    legacy: &LegacyData,
) -> Result<(), MigrationError> {
    debug!(stage = %stage, hook = hook.name(), "Running hook");
    let mut ctx = StageContext::new(store, stage, legacy);
    hook.run(&mut ctx).map_err(|e| MigrationError::HookFailed {
        hook: hook.name().to_string(),
        stage,
        message: e.to_string(),
    })
}

fn elapsed_ms(since: DateTime<Utc>) -> i64 {
    (Utc::now() - since).num_milliseconds().max(0)
}
