//! Migration stages and the stage catalog.

use super::diff::{EntityChange, FieldChange, RelationChange, SchemaDiff};
use super::error::{MigrationError, SafetyGrade};
use super::grader::SafetyGrader;
use super::hooks::MigrationHook;
use crate::catalog::VersionNumber;
use crate::registry::SchemaRegistry;
use std::fmt;
use std::sync::Arc;

/// The pair of adjacent versions a stage connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StageId {
    /// Source version.
    pub from: VersionNumber,
    /// Target version.
    pub to: VersionNumber,
}

impl StageId {
    /// Create a stage id.
    pub fn new(from: VersionNumber, to: VersionNumber) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// How a stage transforms stored rows.
#[derive(Clone)]
pub enum StageKind {
    /// Rows are transformed from the shape diff alone.
    Lightweight,
    /// Hooks run around the structural change.
    Custom {
        /// Runs against the old shape before the change.
        pre: Option<Arc<dyn MigrationHook>>,
        /// Runs against the new shape, with retired legacy values readable.
        post: Option<Arc<dyn MigrationHook>>,
    },
}

impl fmt::Debug for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Lightweight => f.write_str("Lightweight"),
            StageKind::Custom { pre, post } => f
                .debug_struct("Custom")
                .field("pre", &pre.as_ref().map(|h| h.name().to_string()))
                .field("post", &post.as_ref().map(|h| h.name().to_string()))
                .finish(),
        }
    }
}

/// One step between adjacent schema versions.
#[derive(Debug, Clone)]
pub struct MigrationStage {
    /// Source version.
    pub from: VersionNumber,
    /// Target version.
    pub to: VersionNumber,
    /// Transformation kind.
    pub kind: StageKind,
}

impl MigrationStage {
    /// Create a lightweight stage.
    pub fn lightweight(from: VersionNumber, to: VersionNumber) -> Self {
        Self {
            from,
            to,
            kind: StageKind::Lightweight,
        }
    }

    /// Create a custom stage with no hooks.
    pub fn custom(from: VersionNumber, to: VersionNumber) -> Self {
        Self {
            from,
            to,
            kind: StageKind::Custom {
                pre: None,
                post: None,
            },
        }
    }

    /// Set the pre hook, turning the stage custom.
    pub fn with_pre_hook(mut self, hook: Arc<dyn MigrationHook>) -> Self {
        match &mut self.kind {
            StageKind::Custom { pre, .. } => *pre = Some(hook),
            StageKind::Lightweight => {
                self.kind = StageKind::Custom {
                    pre: Some(hook),
                    post: None,
                }
            }
        }
        self
    }

    /// Set the post hook, turning the stage custom.
    pub fn with_post_hook(mut self, hook: Arc<dyn MigrationHook>) -> Self {
        match &mut self.kind {
            StageKind::Custom { post, .. } => *post = Some(hook),
            StageKind::Lightweight => {
                self.kind = StageKind::Custom {
                    pre: None,
                    post: Some(hook),
                }
            }
        }
        self
    }

    /// Stage id.
    pub fn id(&self) -> StageId {
        StageId::new(self.from, self.to)
    }

    /// Check if the stage runs hooks.
    pub fn is_custom(&self) -> bool {
        matches!(self.kind, StageKind::Custom { .. })
    }
}

/// Ordered stages, exactly one per pair of adjacent registry versions.
#[derive(Debug, Clone)]
pub struct StageCatalog {
    stages: Vec<MigrationStage>,
}

impl StageCatalog {
    /// Build a catalog checked against a registry.
    ///
    /// Every stage must connect two adjacent registry versions, and a
    /// lightweight stage may only contain changes no row transform is
    /// needed for. Removals are allowed; their data is dropped.
    pub fn new(
        registry: &SchemaRegistry,
        mut stages: Vec<MigrationStage>,
    ) -> Result<Self, MigrationError> {
        stages.sort_by_key(|s| s.from);

        for pair in stages.windows(2) {
            if pair[0].from == pair[1].from {
                return Err(MigrationError::InvalidStage {
                    stage: pair[1].id(),
                    reason: format!("{} already starts at {}", pair[0].id(), pair[0].from),
                });
            }
        }

        for stage in &stages {
            let from_index = registry
                .index_of(stage.from)
                .ok_or(MigrationError::UnknownVersion(stage.from))?;
            let to_index = registry
                .index_of(stage.to)
                .ok_or(MigrationError::UnknownVersion(stage.to))?;
            if to_index != from_index + 1 {
                return Err(MigrationError::InvalidStage {
                    stage: stage.id(),
                    reason: "does not connect adjacent versions".to_string(),
                });
            }

            if !stage.is_custom() {
                let diff = SchemaDiff::compute(
                    &registry.versions()[from_index],
                    &registry.versions()[to_index],
                );
                Self::check_lightweight(stage.id(), &diff)?;
            }
        }

        Ok(Self { stages })
    }

    fn check_lightweight(stage: StageId, diff: &SchemaDiff) -> Result<(), MigrationError> {
        for change in &diff.entity_changes {
            let EntityChange::Modified {
                entity_name,
                field_changes,
                relation_changes,
            } = change
            else {
                continue;
            };

            for fc in field_changes {
                if let FieldChange::Added(field) = fc {
                    if !field.optional && field.default.is_none() {
                        return Err(MigrationError::MissingDefault {
                            stage,
                            entity: entity_name.clone(),
                            field: field.name.clone(),
                        });
                    }
                }
                if matches!(fc, FieldChange::Removed(_)) {
                    continue;
                }
                let grade = SafetyGrader::grade_field_change(entity_name, fc);
                if grade.grade >= SafetyGrade::C {
                    return Err(MigrationError::RequiresCustomStage {
                        stage,
                        change: grade.change_description,
                        grade: grade.grade,
                    });
                }
            }

            for rc in relation_changes {
                if matches!(rc, RelationChange::Removed(_)) {
                    continue;
                }
                let grade = SafetyGrader::grade_relation_change(entity_name, rc);
                if grade.grade >= SafetyGrade::C {
                    return Err(MigrationError::RequiresCustomStage {
                        stage,
                        change: grade.change_description,
                        grade: grade.grade,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that a stage exists for every pair of adjacent registry
    /// versions.
    pub fn validate_complete(&self, registry: &SchemaRegistry) -> Result<(), MigrationError> {
        for pair in registry.versions().windows(2) {
            let (from, to) = (pair[0].version, pair[1].version);
            if self.stage_from(from).is_none() {
                return Err(MigrationError::MissingStage { from, to });
            }
        }
        Ok(())
    }

    /// All stages, ordered by source version.
    pub fn stages(&self) -> &[MigrationStage] {
        &self.stages
    }

    /// The stage starting at a version.
    pub fn stage_from(&self, from: VersionNumber) -> Option<&MigrationStage> {
        self.stages
            .binary_search_by(|s| s.from.cmp(&from))
            .ok()
            .map(|i| &self.stages[i])
    }

    /// The contiguous chain of stages from `from` to `to`.
    ///
    /// Empty when the versions are equal.
    pub fn path(
        &self,
        from: VersionNumber,
        to: VersionNumber,
    ) -> Result<Vec<&MigrationStage>, MigrationError> {
        if to < from {
            return Err(MigrationError::DowngradeNotSupported { from, to });
        }

        let mut path = Vec::new();
        let mut cursor = from;
        while cursor < to {
            let stage = self
                .stage_from(cursor)
                .ok_or(MigrationError::MissingStage { from: cursor, to })?;
            if stage.to > to {
                return Err(MigrationError::MissingStage { from: cursor, to });
            }
            path.push(stage);
            cursor = stage.to;
        }
        Ok(path)
    }
}
