//! Relation definitions between entities.

use rkyv::{Archive, Deserialize, Serialize};

/// Cardinality of a relation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Cardinality {
    /// At most one dependent row.
    ToOne,
    /// Any number of dependent rows.
    ToMany,
}

/// Behavior applied to dependent rows when the owning row is deleted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum DeleteRule {
    /// Delete dependent rows.
    Cascade,
    /// Set the dependent's reference field to null.
    Nullify,
}

/// A relation declared on the owning entity.
///
/// Dependents live in `target` and reference the owner through
/// `foreign_field`, which holds the owner's row id.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct RelationDef {
    /// Relation name (unique within the owning entity).
    pub name: String,
    /// Dependent entity name.
    pub target: String,
    /// Field on the dependent entity holding the owner id.
    pub foreign_field: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// Delete behavior.
    pub on_delete: DeleteRule,
}

impl RelationDef {
    /// Create a to-one relation.
    pub fn to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_field: foreign_field.into(),
            cardinality: Cardinality::ToOne,
            on_delete: DeleteRule::Nullify,
        }
    }

    /// Create a to-many relation.
    pub fn to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_field: foreign_field.into(),
            cardinality: Cardinality::ToMany,
            on_delete: DeleteRule::Nullify,
        }
    }

    /// Set delete behavior.
    pub fn with_on_delete(mut self, on_delete: DeleteRule) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Check if deleting the owner deletes dependents.
    pub fn cascades(&self) -> bool {
        self.on_delete == DeleteRule::Cascade
    }
}
