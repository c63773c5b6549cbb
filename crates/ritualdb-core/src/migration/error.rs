//! Migration-specific error types.

use super::stage::StageId;
use crate::catalog::VersionNumber;
use std::path::PathBuf;
use thiserror::Error;

/// Safety grade for a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SafetyGrade {
    /// Grade A: additive, no existing row changes.
    /// Examples: new optional fields, new entities, new relations.
    A,
    /// Grade B: existing rows are filled from declared defaults.
    /// Examples: new required fields with defaults, numeric widening.
    B,
    /// Grade C: tightening that needs a data transform.
    /// Examples: optional to required without default, enum variant removal.
    C,
    /// Grade D: destructive.
    /// Examples: field removal, entity removal, incompatible type changes.
    D,
}

impl std::fmt::Display for SafetyGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyGrade::A => write!(f, "A (additive)"),
            SafetyGrade::B => write!(f, "B (default backfill)"),
            SafetyGrade::C => write!(f, "C (custom transform)"),
            SafetyGrade::D => write!(f, "D (destructive)"),
        }
    }
}

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No stage starts at a version on the path.
    #[error("no migration stage from {from} towards {to}")]
    MissingStage {
        /// Version with no outgoing stage.
        from: VersionNumber,
        /// Requested target.
        to: VersionNumber,
    },

    /// The version is not in the registry.
    #[error("unknown schema version {0}")]
    UnknownVersion(VersionNumber),

    /// The target is older than the store.
    #[error("cannot migrate backwards from {from} to {to}")]
    DowngradeNotSupported {
        /// Store version.
        from: VersionNumber,
        /// Requested target.
        to: VersionNumber,
    },

    /// The store does not carry the shape the registry records for its version.
    #[error("store does not match schema version {version}: {message}")]
    SchemaMismatch {
        /// Version the store claims.
        version: VersionNumber,
        /// Description of the mismatch.
        message: String,
    },

    /// A stage does not fit the registry.
    #[error("invalid stage {stage}: {reason}")]
    InvalidStage {
        /// Offending stage.
        stage: StageId,
        /// What is wrong with it.
        reason: String,
    },

    /// A pre or post hook returned an error.
    #[error("hook '{hook}' failed in stage {stage}: {message}")]
    HookFailed {
        /// Hook name.
        hook: String,
        /// Stage the hook belongs to.
        stage: StageId,
        /// Error reported by the hook.
        message: String,
    },

    /// A lightweight stage adds a required field with no default.
    #[error("stage {stage} adds required field '{entity}.{field}' without a default")]
    MissingDefault {
        /// Stage adding the field.
        stage: StageId,
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },

    /// A row does not conform to the target shape after a stage.
    #[error("row {entity}/{id} does not conform to version {version}: {reason}")]
    ValidationFailed {
        /// Target version.
        version: VersionNumber,
        /// Entity name.
        entity: String,
        /// Hex row id, or empty for entity-level failures.
        id: String,
        /// Violation.
        reason: String,
    },

    /// A lightweight stage contains a change that needs a data transform.
    #[error("stage {stage} must be custom: {change} is grade {grade}")]
    RequiresCustomStage {
        /// Offending stage.
        stage: StageId,
        /// Description of the change.
        change: String,
        /// Grade of the change.
        grade: SafetyGrade,
    },

    /// A stage failed; earlier stages stay applied.
    #[error(
        "migration {from} -> {to} failed at stage {failed_stage} after {completed} completed stage(s): {source}"
    )]
    MigrationFailed {
        /// Version the migration started from.
        from: VersionNumber,
        /// Requested target.
        to: VersionNumber,
        /// Stage that failed.
        failed_stage: StageId,
        /// Number of stages applied and checkpointed before the failure.
        completed: usize,
        /// Snapshots taken during this run, oldest first. The last one holds
        /// the store as it was before the newest custom stage was entered.
        snapshots: Vec<PathBuf>,
        /// Underlying cause.
        source: Box<MigrationError>,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}

impl MigrationError {
    /// The innermost error, looking through [`MigrationError::MigrationFailed`].
    pub fn root_cause(&self) -> &MigrationError {
        match self {
            MigrationError::MigrationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_grade_ordering() {
        assert!(SafetyGrade::A < SafetyGrade::B);
        assert!(SafetyGrade::B < SafetyGrade::C);
        assert!(SafetyGrade::C < SafetyGrade::D);
    }

    #[test]
    fn test_error_display() {
        let stage = StageId::new(VersionNumber::new(4, 0, 0), VersionNumber::new(5, 0, 0));
        let err = MigrationError::MigrationFailed {
            from: VersionNumber::new(1, 0, 0),
            to: VersionNumber::new(8, 0, 0),
            failed_stage: stage,
            completed: 3,
            snapshots: Vec::new(),
            source: Box::new(MigrationError::HookFailed {
                hook: "backfill-start-date".to_string(),
                stage,
                message: "boom".to_string(),
            }),
        };

        let text = err.to_string();
        assert!(text.contains("4.0.0 -> 5.0.0"));
        assert!(text.contains("after 3 completed"));
        assert!(matches!(err.root_cause(), MigrationError::HookFailed { .. }));
    }
}
