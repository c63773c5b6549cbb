//! Entity shapes.

use super::field::FieldDef;
use super::relation::RelationDef;
use rkyv::{Archive, Deserialize, Serialize};

/// Name of the identity field every entity carries.
pub const IDENTITY_FIELD: &str = "id";

/// A named entity with its fields and relations.
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub struct EntityShape {
    /// Entity name (unique within a schema version).
    pub name: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
    /// Relations owned by this entity.
    pub relations: Vec<RelationDef>,
}

impl EntityShape {
    /// Create a new entity shape with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a relation by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Iterate field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Copy of this shape with fields and relations sorted by name.
    ///
    /// Declaration order carries no structural meaning, so comparisons and
    /// checksums go through this form.
    pub fn normalized(&self) -> Self {
        let mut shape = self.clone();
        shape.fields.sort_by(|a, b| a.name.cmp(&b.name));
        shape.relations.sort_by(|a, b| a.name.cmp(&b.name));
        shape
    }

    /// Structural equality ignoring declaration order.
    pub fn same_structure(&self, other: &EntityShape) -> bool {
        self.normalized() == other.normalized()
    }
}
