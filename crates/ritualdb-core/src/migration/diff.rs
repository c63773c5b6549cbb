//! Schema diffing algorithm.
//!
//! Compares two schema versions and produces a structured diff of all changes
//! between them. Output order is deterministic: entities, fields and
//! relations are visited by name.

use crate::catalog::{
    DefaultValue, EntityShape, FieldDef, FieldType, RelationDef, SchemaVersion, VersionNumber,
};
use std::collections::{BTreeMap, BTreeSet};

/// Complete diff between two schema versions.
#[derive(Debug, Clone)]
pub struct SchemaDiff {
    /// Source schema version.
    pub from_version: VersionNumber,
    /// Target schema version.
    pub to_version: VersionNumber,
    /// Changes to entities.
    pub entity_changes: Vec<EntityChange>,
}

impl SchemaDiff {
    /// Compute the diff between two schema versions.
    pub fn compute(from: &SchemaVersion, to: &SchemaVersion) -> Self {
        SchemaDiff {
            from_version: from.version,
            to_version: to.version,
            entity_changes: Self::diff_entities(&from.entities, &to.entities),
        }
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.entity_changes.is_empty()
    }

    /// Get the total number of field, relation and entity changes.
    pub fn change_count(&self) -> usize {
        self.entity_changes
            .iter()
            .map(|c| match c {
                EntityChange::Modified {
                    field_changes,
                    relation_changes,
                    ..
                } => field_changes.len() + relation_changes.len(),
                _ => 1,
            })
            .sum()
    }

    fn diff_entities(
        from: &BTreeMap<String, EntityShape>,
        to: &BTreeMap<String, EntityShape>,
    ) -> Vec<EntityChange> {
        let mut changes = Vec::new();

        let from_names: BTreeSet<_> = from.keys().collect();
        let to_names: BTreeSet<_> = to.keys().collect();

        // Added entities
        for name in to_names.difference(&from_names) {
            changes.push(EntityChange::Added(to[*name].clone()));
        }

        // Removed entities
        for name in from_names.difference(&to_names) {
            changes.push(EntityChange::Removed(from[*name].clone()));
        }

        // Modified entities
        for name in from_names.intersection(&to_names) {
            let from_entity = &from[*name];
            let to_entity = &to[*name];

            if from_entity.same_structure(to_entity) {
                continue;
            }
            let field_changes = Self::diff_fields(&from_entity.fields, &to_entity.fields);
            let relation_changes =
                Self::diff_relations(&from_entity.relations, &to_entity.relations);

            if !field_changes.is_empty() || !relation_changes.is_empty() {
                changes.push(EntityChange::Modified {
                    entity_name: (*name).to_string(),
                    field_changes,
                    relation_changes,
                });
            }
        }

        changes
    }

    fn diff_fields(from: &[FieldDef], to: &[FieldDef]) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        let from_map: BTreeMap<_, _> = from.iter().map(|f| (&f.name, f)).collect();
        let to_map: BTreeMap<_, _> = to.iter().map(|f| (&f.name, f)).collect();

        // Added fields
        for (name, field) in &to_map {
            if !from_map.contains_key(name) {
                changes.push(FieldChange::Added((*field).clone()));
            }
        }

        // Removed fields
        for (name, field) in &from_map {
            if !to_map.contains_key(name) {
                changes.push(FieldChange::Removed((*field).clone()));
            }
        }

        // Modified fields
        for (name, from_field) in &from_map {
            let Some(to_field) = to_map.get(name) else {
                continue;
            };

            if from_field.field_type != to_field.field_type {
                changes.push(FieldChange::TypeChanged {
                    field_name: (*name).to_string(),
                    from_type: from_field.field_type.clone(),
                    to_type: to_field.field_type.clone(),
                });
            }

            if from_field.optional != to_field.optional {
                changes.push(FieldChange::OptionalityChanged {
                    field_name: (*name).to_string(),
                    from_optional: from_field.optional,
                    to_optional: to_field.optional,
                    has_default: to_field.default.is_some(),
                });
            }

            if from_field.default != to_field.default {
                changes.push(FieldChange::DefaultChanged {
                    field_name: (*name).to_string(),
                    from_default: from_field.default.clone(),
                    to_default: to_field.default.clone(),
                });
            }
        }

        changes
    }

    fn diff_relations(from: &[RelationDef], to: &[RelationDef]) -> Vec<RelationChange> {
        let mut changes = Vec::new();

        let from_map: BTreeMap<_, _> = from.iter().map(|r| (&r.name, r)).collect();
        let to_map: BTreeMap<_, _> = to.iter().map(|r| (&r.name, r)).collect();

        for (name, relation) in &to_map {
            match from_map.get(name) {
                None => changes.push(RelationChange::Added((*relation).clone())),
                Some(old) if old != relation => changes.push(RelationChange::Modified {
                    relation_name: (*name).to_string(),
                    from: (*old).clone(),
                    to: (*relation).clone(),
                }),
                Some(_) => {}
            }
        }

        for (name, relation) in &from_map {
            if !to_map.contains_key(name) {
                changes.push(RelationChange::Removed((*relation).clone()));
            }
        }

        changes
    }
}

/// Change to an entity.
#[derive(Debug, Clone)]
pub enum EntityChange {
    /// Entity was added.
    Added(EntityShape),
    /// Entity was removed.
    Removed(EntityShape),
    /// Entity was modified.
    Modified {
        /// Name of the entity.
        entity_name: String,
        /// Changes to fields.
        field_changes: Vec<FieldChange>,
        /// Changes to owned relations.
        relation_changes: Vec<RelationChange>,
    },
}

impl EntityChange {
    /// Get the entity name for this change.
    pub fn entity_name(&self) -> &str {
        match self {
            EntityChange::Added(e) => &e.name,
            EntityChange::Removed(e) => &e.name,
            EntityChange::Modified { entity_name, .. } => entity_name,
        }
    }
}

/// Change to a field within an entity.
#[derive(Debug, Clone)]
pub enum FieldChange {
    /// Field was added.
    Added(FieldDef),
    /// Field was removed.
    Removed(FieldDef),
    /// Field type was changed.
    TypeChanged {
        /// Name of the field.
        field_name: String,
        /// Original type.
        from_type: FieldType,
        /// New type.
        to_type: FieldType,
    },
    /// Field optionality was changed.
    OptionalityChanged {
        /// Name of the field.
        field_name: String,
        /// Was optional before.
        from_optional: bool,
        /// Is optional now.
        to_optional: bool,
        /// Whether the field has a default value.
        has_default: bool,
    },
    /// Field default value was changed.
    DefaultChanged {
        /// Name of the field.
        field_name: String,
        /// Original default value.
        from_default: Option<DefaultValue>,
        /// New default value.
        to_default: Option<DefaultValue>,
    },
}

impl FieldChange {
    /// Get the field name for this change.
    pub fn field_name(&self) -> &str {
        match self {
            FieldChange::Added(f) => &f.name,
            FieldChange::Removed(f) => &f.name,
            FieldChange::TypeChanged { field_name, .. } => field_name,
            FieldChange::OptionalityChanged { field_name, .. } => field_name,
            FieldChange::DefaultChanged { field_name, .. } => field_name,
        }
    }
}

/// Change to a relation owned by an entity.
#[derive(Debug, Clone)]
pub enum RelationChange {
    /// Relation was added.
    Added(RelationDef),
    /// Relation was removed.
    Removed(RelationDef),
    /// Relation was modified.
    Modified {
        /// Name of the relation.
        relation_name: String,
        /// Definition before.
        from: RelationDef,
        /// Definition after.
        to: RelationDef,
    },
}

impl RelationChange {
    /// Get the relation name for this change.
    pub fn relation_name(&self) -> &str {
        match self {
            RelationChange::Added(r) => &r.name,
            RelationChange::Removed(r) => &r.name,
            RelationChange::Modified { relation_name, .. } => relation_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DeleteRule, ScalarType};

    fn habit() -> EntityShape {
        EntityShape::new("Habit")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
    }

    fn schema(version: u32, entities: Vec<EntityShape>) -> SchemaVersion {
        SchemaVersion::with_entities(VersionNumber::new(version, 0, 0), entities)
    }

    #[test]
    fn test_no_changes() {
        let a = schema(1, vec![habit()]);
        let b = schema(2, vec![habit()]);

        let diff = SchemaDiff::compute(&a, &b);
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn test_entity_added_and_removed() {
        let log = EntityShape::new("HabitLog")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)));
        let diff = SchemaDiff::compute(&schema(1, vec![habit()]), &schema(2, vec![log]));

        assert_eq!(diff.entity_changes.len(), 2);
        assert!(matches!(&diff.entity_changes[0], EntityChange::Added(e) if e.name == "HabitLog"));
        assert!(matches!(&diff.entity_changes[1], EntityChange::Removed(e) if e.name == "Habit"));
    }

    #[test]
    fn test_field_changes() {
        let v2 = EntityShape::new("Habit")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
            .with_field(
                FieldDef::optional("name", FieldType::scalar(ScalarType::String))
                    .with_default(DefaultValue::String(String::new())),
            )
            .with_field(FieldDef::optional(
                "archivedAt",
                FieldType::scalar(ScalarType::Timestamp),
            ));

        let diff = SchemaDiff::compute(&schema(1, vec![habit()]), &schema(2, vec![v2]));
        let EntityChange::Modified { field_changes, .. } = &diff.entity_changes[0] else {
            panic!("Expected Modified");
        };

        let names: Vec<_> = field_changes.iter().map(|c| c.field_name()).collect();
        assert_eq!(names, vec!["archivedAt", "name", "name"]);
        assert!(matches!(field_changes[0], FieldChange::Added(_)));
        assert!(matches!(
            field_changes[1],
            FieldChange::OptionalityChanged {
                to_optional: true,
                ..
            }
        ));
        assert!(matches!(field_changes[2], FieldChange::DefaultChanged { .. }));
    }

    #[test]
    fn test_relation_changes() {
        let category = EntityShape::new("HabitCategory")
            .with_relation(RelationDef::to_many("habits", "Habit", "categoryId"));
        let category_v2 = EntityShape::new("HabitCategory").with_relation(
            RelationDef::to_many("habits", "Habit", "categoryId").with_on_delete(DeleteRule::Cascade),
        );

        let diff = SchemaDiff::compute(&schema(1, vec![category]), &schema(2, vec![category_v2]));
        let EntityChange::Modified {
            relation_changes, ..
        } = &diff.entity_changes[0]
        else {
            panic!("Expected Modified");
        };
        assert!(matches!(
            &relation_changes[0],
            RelationChange::Modified { relation_name, .. } if relation_name == "habits"
        ));
    }

    #[test]
    fn test_declaration_order_is_not_a_change() {
        let reordered = EntityShape::new("Habit")
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)));

        let diff = SchemaDiff::compute(&schema(1, vec![habit()]), &schema(2, vec![reordered]));
        assert!(diff.is_empty());
    }
}
