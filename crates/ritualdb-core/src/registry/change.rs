//! Invertible schema changes.

use crate::catalog::{EntityShape, FieldDef, RelationDef};
use std::collections::BTreeMap;
use std::fmt;

/// One structural change between consecutive schema versions.
///
/// Every change carries enough information to be inverted, so historical
/// shapes can be derived by replaying inverses backward from the current one.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SchemaChange {
    /// Add an entity.
    AddEntity(EntityShape),
    /// Remove an entity.
    RemoveEntity(EntityShape),
    /// Add a field to an entity.
    AddField {
        /// Entity name.
        entity: String,
        /// Added field.
        field: FieldDef,
    },
    /// Remove a field from an entity.
    RemoveField {
        /// Entity name.
        entity: String,
        /// Removed field as it was before removal.
        field: FieldDef,
    },
    /// Replace a field definition, keeping its name.
    ChangeField {
        /// Entity name.
        entity: String,
        /// Definition before the change.
        from: FieldDef,
        /// Definition after the change.
        to: FieldDef,
    },
    /// Add a relation to its owning entity.
    AddRelation {
        /// Owning entity name.
        entity: String,
        /// Added relation.
        relation: RelationDef,
    },
    /// Remove a relation from its owning entity.
    RemoveRelation {
        /// Owning entity name.
        entity: String,
        /// Removed relation.
        relation: RelationDef,
    },
}

impl SchemaChange {
    /// Add a field.
    pub fn add_field(entity: impl Into<String>, field: FieldDef) -> Self {
        SchemaChange::AddField {
            entity: entity.into(),
            field,
        }
    }

    /// Remove a field.
    pub fn remove_field(entity: impl Into<String>, field: FieldDef) -> Self {
        SchemaChange::RemoveField {
            entity: entity.into(),
            field,
        }
    }

    /// Replace a field definition.
    pub fn change_field(entity: impl Into<String>, from: FieldDef, to: FieldDef) -> Self {
        SchemaChange::ChangeField {
            entity: entity.into(),
            from,
            to,
        }
    }

    /// Add a relation.
    pub fn add_relation(entity: impl Into<String>, relation: RelationDef) -> Self {
        SchemaChange::AddRelation {
            entity: entity.into(),
            relation,
        }
    }

    /// Remove a relation.
    pub fn remove_relation(entity: impl Into<String>, relation: RelationDef) -> Self {
        SchemaChange::RemoveRelation {
            entity: entity.into(),
            relation,
        }
    }

    /// Name of the entity this change touches.
    pub fn entity(&self) -> &str {
        match self {
            SchemaChange::AddEntity(shape) | SchemaChange::RemoveEntity(shape) => &shape.name,
            SchemaChange::AddField { entity, .. }
            | SchemaChange::RemoveField { entity, .. }
            | SchemaChange::ChangeField { entity, .. }
            | SchemaChange::AddRelation { entity, .. }
            | SchemaChange::RemoveRelation { entity, .. } => entity,
        }
    }

    /// The change that undoes this one.
    pub fn inverse(&self) -> SchemaChange {
        match self {
            SchemaChange::AddEntity(shape) => SchemaChange::RemoveEntity(shape.clone()),
            SchemaChange::RemoveEntity(shape) => SchemaChange::AddEntity(shape.clone()),
            SchemaChange::AddField { entity, field } => SchemaChange::RemoveField {
                entity: entity.clone(),
                field: field.clone(),
            },
            SchemaChange::RemoveField { entity, field } => SchemaChange::AddField {
                entity: entity.clone(),
                field: field.clone(),
            },
            SchemaChange::ChangeField { entity, from, to } => SchemaChange::ChangeField {
                entity: entity.clone(),
                from: to.clone(),
                to: from.clone(),
            },
            SchemaChange::AddRelation { entity, relation } => SchemaChange::RemoveRelation {
                entity: entity.clone(),
                relation: relation.clone(),
            },
            SchemaChange::RemoveRelation { entity, relation } => SchemaChange::AddRelation {
                entity: entity.clone(),
                relation: relation.clone(),
            },
        }
    }

    /// Apply the change to a set of shapes keyed by entity name.
    ///
    /// Fails without modifying `shapes` when the change does not match the
    /// shape it is applied to; the error is a human-readable reason.
    pub fn apply(&self, shapes: &mut BTreeMap<String, EntityShape>) -> Result<(), String> {
        match self {
            SchemaChange::AddEntity(shape) => {
                if shapes.contains_key(&shape.name) {
                    return Err(format!("entity '{}' already exists", shape.name));
                }
                shapes.insert(shape.name.clone(), shape.clone());
            }
            SchemaChange::RemoveEntity(shape) => {
                let existing = entity(shapes, &shape.name)?;
                if !existing.same_structure(shape) {
                    return Err(format!(
                        "entity '{}' does not match the removed shape",
                        shape.name
                    ));
                }
                shapes.remove(&shape.name);
            }
            SchemaChange::AddField { entity: name, field } => {
                let shape = entity_mut(shapes, name)?;
                if shape.get_field(&field.name).is_some() {
                    return Err(format!("field '{}.{}' already exists", name, field.name));
                }
                shape.fields.push(field.clone());
            }
            SchemaChange::RemoveField { entity: name, field } => {
                let shape = entity_mut(shapes, name)?;
                match shape.fields.iter().position(|f| f.name == field.name) {
                    Some(i) if shape.fields[i] == *field => {
                        shape.fields.remove(i);
                    }
                    Some(_) => {
                        return Err(format!(
                            "field '{}.{}' does not match the removed definition",
                            name, field.name
                        ))
                    }
                    None => return Err(format!("field '{}.{}' does not exist", name, field.name)),
                }
            }
            SchemaChange::ChangeField {
                entity: name,
                from,
                to,
            } => {
                if from.name != to.name {
                    return Err(format!(
                        "field change must keep its name ('{}' to '{}')",
                        from.name, to.name
                    ));
                }
                let shape = entity_mut(shapes, name)?;
                match shape.fields.iter_mut().find(|f| f.name == from.name) {
                    Some(field) if *field == *from => *field = to.clone(),
                    Some(_) => {
                        return Err(format!(
                            "field '{}.{}' does not match the changed definition",
                            name, from.name
                        ))
                    }
                    None => return Err(format!("field '{}.{}' does not exist", name, from.name)),
                }
            }
            SchemaChange::AddRelation {
                entity: name,
                relation,
            } => {
                let shape = entity_mut(shapes, name)?;
                if shape.get_relation(&relation.name).is_some() {
                    return Err(format!(
                        "relation '{}.{}' already exists",
                        name, relation.name
                    ));
                }
                shape.relations.push(relation.clone());
            }
            SchemaChange::RemoveRelation {
                entity: name,
                relation,
            } => {
                let shape = entity_mut(shapes, name)?;
                match shape.relations.iter().position(|r| r == relation) {
                    Some(i) => {
                        shape.relations.remove(i);
                    }
                    None => {
                        return Err(format!(
                            "relation '{}.{}' does not exist",
                            name, relation.name
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

fn entity<'a>(
    shapes: &'a BTreeMap<String, EntityShape>,
    name: &str,
) -> Result<&'a EntityShape, String> {
    shapes
        .get(name)
        .ok_or_else(|| format!("entity '{}' does not exist", name))
}

fn entity_mut<'a>(
    shapes: &'a mut BTreeMap<String, EntityShape>,
    name: &str,
) -> Result<&'a mut EntityShape, String> {
    shapes
        .get_mut(name)
        .ok_or_else(|| format!("entity '{}' does not exist", name))
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::AddEntity(shape) => write!(f, "add entity {}", shape.name),
            SchemaChange::RemoveEntity(shape) => write!(f, "remove entity {}", shape.name),
            SchemaChange::AddField { entity, field } => {
                write!(f, "add field {}.{}: {}", entity, field.name, field.field_type)
            }
            SchemaChange::RemoveField { entity, field } => {
                write!(f, "remove field {}.{}", entity, field.name)
            }
            SchemaChange::ChangeField { entity, from, to } => write!(
                f,
                "change field {}.{}: {} -> {}",
                entity, from.name, from.field_type, to.field_type
            ),
            SchemaChange::AddRelation { entity, relation } => {
                write!(f, "add relation {}.{} -> {}", entity, relation.name, relation.target)
            }
            SchemaChange::RemoveRelation { entity, relation } => {
                write!(f, "remove relation {}.{}", entity, relation.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldType, ScalarType};

    fn shapes() -> BTreeMap<String, EntityShape> {
        let habit = EntityShape::new("Habit")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)));
        BTreeMap::from([(habit.name.clone(), habit)])
    }

    #[test]
    fn test_apply_then_inverse_restores_shape() {
        let original = shapes();
        let changes = vec![
            SchemaChange::add_field(
                "Habit",
                FieldDef::optional("archivedAt", FieldType::scalar(ScalarType::Timestamp)),
            ),
            SchemaChange::change_field(
                "Habit",
                FieldDef::new("name", FieldType::scalar(ScalarType::String)),
                FieldDef::optional("name", FieldType::scalar(ScalarType::String)),
            ),
            SchemaChange::AddEntity(EntityShape::new("HabitCategory")),
            SchemaChange::add_relation(
                "HabitCategory",
                RelationDef::to_many("habits", "Habit", "categoryId"),
            ),
        ];

        let mut current = original.clone();
        for change in &changes {
            change.apply(&mut current).unwrap();
        }
        assert_eq!(current.len(), 2);

        for change in changes.iter().rev() {
            change.inverse().apply(&mut current).unwrap();
        }
        assert_eq!(current, original);
    }

    #[test]
    fn test_preconditions() {
        let mut current = shapes();

        let duplicate = SchemaChange::add_field(
            "Habit",
            FieldDef::new("name", FieldType::scalar(ScalarType::String)),
        );
        assert!(duplicate.apply(&mut current).is_err());

        let missing_entity = SchemaChange::add_field(
            "Goal",
            FieldDef::new("name", FieldType::scalar(ScalarType::String)),
        );
        assert!(missing_entity.apply(&mut current).is_err());

        let mismatched = SchemaChange::remove_field(
            "Habit",
            FieldDef::optional("name", FieldType::scalar(ScalarType::String)),
        );
        assert!(mismatched.apply(&mut current).is_err());

        assert_eq!(current, shapes());
    }

    #[test]
    fn test_display() {
        let change = SchemaChange::add_field(
            "Habit",
            FieldDef::optional("archivedAt", FieldType::scalar(ScalarType::Timestamp)),
        );
        assert_eq!(change.to_string(), "add field Habit.archivedAt: timestamp");
        assert_eq!(change.entity(), "Habit");
    }
}
