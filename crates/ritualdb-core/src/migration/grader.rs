//! Safety grading for schema migrations.
//!
//! Analyzes a schema diff and assigns safety grades (A/B/C/D)
//! based on the impact of each change on stored rows.

use super::diff::{EntityChange, FieldChange, RelationChange, SchemaDiff};
use super::error::SafetyGrade;
use crate::catalog::{FieldType, ScalarType};
use std::collections::BTreeSet;

/// Detailed grading result for a single change.
#[derive(Debug, Clone)]
pub struct ChangeGrade {
    /// The safety grade for this change.
    pub grade: SafetyGrade,
    /// Description of the change.
    pub change_description: String,
    /// Reasoning for the grade.
    pub reasoning: String,
    /// Whether existing rows are filled from a default.
    pub requires_backfill: bool,
    /// Whether a hook has to transform existing rows.
    pub requires_data_migration: bool,
}

impl ChangeGrade {
    fn new(
        grade: SafetyGrade,
        description: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            grade,
            change_description: description.into(),
            reasoning: reasoning.into(),
            requires_backfill: false,
            requires_data_migration: false,
        }
    }

    fn with_backfill(mut self) -> Self {
        self.requires_backfill = true;
        self
    }

    fn with_data_migration(mut self) -> Self {
        self.requires_data_migration = true;
        self
    }
}

/// Complete grading result for a migration stage.
#[derive(Debug, Clone)]
pub struct MigrationGrade {
    /// The overall safety grade (worst grade among all changes).
    pub overall_grade: SafetyGrade,
    /// Individual grades for each change.
    pub change_grades: Vec<ChangeGrade>,
    /// Changes that need a data transform or destroy data (grade C or D).
    pub blocking_changes: Vec<ChangeGrade>,
    /// Warnings about the migration.
    pub warnings: Vec<String>,
}

impl MigrationGrade {
    /// Check if any backfill is required.
    pub fn requires_backfill(&self) -> bool {
        self.change_grades.iter().any(|g| g.requires_backfill)
    }

    /// Check if any data migration is required.
    pub fn requires_data_migration(&self) -> bool {
        self.change_grades.iter().any(|g| g.requires_data_migration)
    }

    /// Check if the stage can run without a hook.
    pub fn is_lightweight(&self) -> bool {
        self.overall_grade <= SafetyGrade::B
    }
}

/// Grades schema diffs for safety.
pub struct SafetyGrader;

impl SafetyGrader {
    /// Grade a schema diff.
    pub fn grade(diff: &SchemaDiff) -> MigrationGrade {
        let mut change_grades = Vec::new();
        let mut overall_grade = SafetyGrade::A;

        for change in &diff.entity_changes {
            for grade in Self::grade_entity_change(change) {
                overall_grade = overall_grade.max(grade.grade);
                change_grades.push(grade);
            }
        }

        let blocking_changes: Vec<_> = change_grades
            .iter()
            .filter(|g| g.grade >= SafetyGrade::C)
            .cloned()
            .collect();

        let warnings = Self::generate_warnings(&change_grades, diff);

        MigrationGrade {
            overall_grade,
            change_grades,
            blocking_changes,
            warnings,
        }
    }

    fn grade_entity_change(change: &EntityChange) -> Vec<ChangeGrade> {
        match change {
            EntityChange::Added(entity) => vec![ChangeGrade::new(
                SafetyGrade::A,
                format!("Add entity '{}'", entity.name),
                "Adding new entities is non-breaking",
            )],

            EntityChange::Removed(entity) => vec![ChangeGrade::new(
                SafetyGrade::D,
                format!("Remove entity '{}'", entity.name),
                "Removing entities destroys stored rows",
            )
            .with_data_migration()],

            EntityChange::Modified {
                entity_name,
                field_changes,
                relation_changes,
            } => field_changes
                .iter()
                .map(|fc| Self::grade_field_change(entity_name, fc))
                .chain(
                    relation_changes
                        .iter()
                        .map(|rc| Self::grade_relation_change(entity_name, rc)),
                )
                .collect(),
        }
    }

    /// Grade one field change.
    pub fn grade_field_change(entity_name: &str, change: &FieldChange) -> ChangeGrade {
        match change {
            FieldChange::Added(field) => {
                if field.optional {
                    ChangeGrade::new(
                        SafetyGrade::A,
                        format!("Add optional field '{}.{}'", entity_name, field.name),
                        "Existing rows start with null",
                    )
                } else if field.default.is_some() {
                    ChangeGrade::new(
                        SafetyGrade::B,
                        format!(
                            "Add required field '{}.{}' with default",
                            entity_name, field.name
                        ),
                        "Existing rows are filled with the default",
                    )
                    .with_backfill()
                } else {
                    ChangeGrade::new(
                        SafetyGrade::C,
                        format!(
                            "Add required field '{}.{}' without default",
                            entity_name, field.name
                        ),
                        "A hook has to compute the value for existing rows",
                    )
                    .with_data_migration()
                }
            }

            FieldChange::Removed(field) => ChangeGrade::new(
                SafetyGrade::D,
                format!("Remove field '{}.{}'", entity_name, field.name),
                "Removing fields destroys data",
            )
            .with_data_migration(),

            FieldChange::TypeChanged {
                field_name,
                from_type,
                to_type,
            } => {
                let grade = Self::grade_type_change(from_type, to_type);
                let mut change_grade = ChangeGrade::new(
                    grade,
                    format!(
                        "Change type of '{}.{}' from {} to {}",
                        entity_name, field_name, from_type, to_type
                    ),
                    match grade {
                        SafetyGrade::A => "Every existing value remains valid",
                        SafetyGrade::B => "Type widening converts values losslessly",
                        SafetyGrade::C => "Some values need a transform",
                        SafetyGrade::D => "Incompatible type change",
                    },
                );

                if grade >= SafetyGrade::B {
                    change_grade = change_grade.with_backfill();
                }
                if grade >= SafetyGrade::C {
                    change_grade = change_grade.with_data_migration();
                }

                change_grade
            }

            FieldChange::OptionalityChanged {
                field_name,
                to_optional,
                has_default,
                ..
            } => {
                if *to_optional {
                    ChangeGrade::new(
                        SafetyGrade::A,
                        format!("Make '{}.{}' optional", entity_name, field_name),
                        "Making fields optional is non-breaking",
                    )
                } else if *has_default {
                    ChangeGrade::new(
                        SafetyGrade::B,
                        format!(
                            "Make '{}.{}' required (has default)",
                            entity_name, field_name
                        ),
                        "Null values are replaced by the default",
                    )
                    .with_backfill()
                } else {
                    ChangeGrade::new(
                        SafetyGrade::C,
                        format!(
                            "Make '{}.{}' required (no default)",
                            entity_name, field_name
                        ),
                        "A hook has to replace existing null values",
                    )
                    .with_data_migration()
                }
            }

            FieldChange::DefaultChanged { field_name, .. } => ChangeGrade::new(
                SafetyGrade::A,
                format!("Change default for '{}.{}'", entity_name, field_name),
                "Default changes only affect new rows",
            ),
        }
    }

    /// Grade one relation change.
    pub fn grade_relation_change(entity_name: &str, change: &RelationChange) -> ChangeGrade {
        match change {
            RelationChange::Added(relation) => ChangeGrade::new(
                SafetyGrade::A,
                format!("Add relation '{}.{}'", entity_name, relation.name),
                "Adding relations is non-breaking",
            ),

            RelationChange::Removed(relation) => ChangeGrade::new(
                SafetyGrade::D,
                format!("Remove relation '{}.{}'", entity_name, relation.name),
                "Dependents are no longer maintained on delete",
            ),

            RelationChange::Modified {
                relation_name,
                from,
                to,
            } => {
                if from.target != to.target || from.foreign_field != to.foreign_field {
                    ChangeGrade::new(
                        SafetyGrade::D,
                        format!(
                            "Retarget relation '{}.{}' to {}.{}",
                            entity_name, relation_name, to.target, to.foreign_field
                        ),
                        "Existing foreign keys point at the old target",
                    )
                    .with_data_migration()
                } else if from.cardinality != to.cardinality {
                    ChangeGrade::new(
                        SafetyGrade::C,
                        format!(
                            "Change cardinality of '{}.{}' to {:?}",
                            entity_name, relation_name, to.cardinality
                        ),
                        "Existing rows may hold more dependents than allowed",
                    )
                    .with_data_migration()
                } else {
                    ChangeGrade::new(
                        SafetyGrade::A,
                        format!(
                            "Change delete rule of '{}.{}' to {:?}",
                            entity_name, relation_name, to.on_delete
                        ),
                        "Delete rules only affect future deletes",
                    )
                }
            }
        }
    }

    fn grade_type_change(from: &FieldType, to: &FieldType) -> SafetyGrade {
        match (from, to) {
            _ if from == to => SafetyGrade::A,

            // Widenings
            (FieldType::Scalar(ScalarType::Int), FieldType::Scalar(ScalarType::Float)) => {
                SafetyGrade::B
            }
            (FieldType::Scalar(a), FieldType::Array(b)) if a == b => SafetyGrade::B,
            (FieldType::Enum { .. }, FieldType::Scalar(ScalarType::String)) => SafetyGrade::A,

            // Enum variants
            (
                FieldType::Enum {
                    variants: from_variants,
                    ..
                },
                FieldType::Enum {
                    variants: to_variants,
                    ..
                },
            ) => {
                let from_set: BTreeSet<_> = from_variants.iter().collect();
                let to_set: BTreeSet<_> = to_variants.iter().collect();
                if from_set.is_subset(&to_set) {
                    SafetyGrade::A
                } else {
                    SafetyGrade::C
                }
            }

            // Narrowings
            (FieldType::Scalar(ScalarType::Float), FieldType::Scalar(ScalarType::Int)) => {
                SafetyGrade::C
            }
            (FieldType::Scalar(ScalarType::String), FieldType::Enum { .. }) => SafetyGrade::C,

            _ => SafetyGrade::D,
        }
    }

    fn generate_warnings(grades: &[ChangeGrade], diff: &SchemaDiff) -> Vec<String> {
        let mut warnings = Vec::new();

        let destructive = grades.iter().filter(|g| g.grade == SafetyGrade::D).count();
        if destructive > 0 {
            warnings.push(format!(
                "{} destructive change(s) in {} -> {}; retired data is dropped after the stage",
                destructive, diff.from_version, diff.to_version
            ));
        }

        let backfills = grades.iter().filter(|g| g.requires_backfill).count();
        if backfills > 0 {
            warnings.push(format!("{} change(s) backfill existing rows", backfills));
        }

        warnings
    }
}
