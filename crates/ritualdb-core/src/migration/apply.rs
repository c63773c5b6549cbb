//! Applying a schema diff to stored rows.

use super::diff::{EntityChange, FieldChange, SchemaDiff};
use super::error::MigrationError;
use super::hooks::{LegacyData, LegacyValues};
use super::stage::StageId;
use crate::catalog::{FieldType, ScalarType, SchemaVersion};
use crate::store::{check_row, RecordStore, RowId, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// How strictly [`apply_diff`] treats rows it cannot fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyMode {
    /// Every row must be completed from defaults.
    Lightweight,
    /// A post hook completes rows; retired values are kept for it.
    Custom,
}

/// Transform the store from the diff's source shape to `target`.
///
/// Tables are created only for added entities the store hosts. Existing
/// tables are migrated whether or not they are hosted. Returns the values
/// the change retired; always empty in lightweight mode.
pub(crate) fn apply_diff(
    store: &mut RecordStore,
    diff: &SchemaDiff,
    target: &SchemaVersion,
    stage: StageId,
    mode: ApplyMode,
) -> Result<LegacyData, MigrationError> {
    let mut legacy = LegacyData::default();

    for change in &diff.entity_changes {
        match change {
            EntityChange::Added(shape) => {
                if store.hosts(&shape.name) && !store.has_table(&shape.name) {
                    debug!(entity = %shape.name, "Creating table");
                    store.create_table(shape.clone());
                }
            }

            EntityChange::Removed(shape) => {
                if let Some((_, rows)) = store.drop_table(&shape.name) {
                    debug!(entity = %shape.name, rows = rows.len(), "Dropping table");
                    if mode == ApplyMode::Custom {
                        legacy.entities.insert(shape.name.clone(), rows);
                    }
                }
            }

            EntityChange::Modified {
                entity_name,
                field_changes,
                ..
            } => {
                if !store.has_table(entity_name) {
                    continue;
                }
                let Some(target_shape) = target.get_entity(entity_name) else {
                    continue;
                };

                let mut retired: BTreeMap<RowId, LegacyValues> = BTreeMap::new();
                for row in store.rows_mut(entity_name)? {
                    for fc in field_changes {
                        match fc {
                            FieldChange::Added(field) => {
                                if row.values.contains_key(&field.name) {
                                    continue;
                                }
                                match field.initial_value() {
                                    Some(value) => row.put(field.name.clone(), value),
                                    None if mode == ApplyMode::Custom => {}
                                    None => {
                                        return Err(MigrationError::MissingDefault {
                                            stage,
                                            entity: entity_name.clone(),
                                            field: field.name.clone(),
                                        })
                                    }
                                }
                            }

                            FieldChange::Removed(field) => {
                                if let Some(value) = row.remove(&field.name) {
                                    retired
                                        .entry(row.id)
                                        .or_default()
                                        .insert(field.name.clone(), value);
                                }
                            }

                            FieldChange::TypeChanged {
                                field_name,
                                to_type,
                                ..
                            } => {
                                let Some(value) = row.remove(field_name) else {
                                    continue;
                                };
                                retired
                                    .entry(row.id)
                                    .or_default()
                                    .insert(field_name.clone(), value.clone());
                                let converted = convert_value(value, to_type).or_else(|| {
                                    target_shape
                                        .get_field(field_name)
                                        .and_then(|f| f.initial_value())
                                });
                                if let Some(value) = converted {
                                    row.put(field_name.clone(), value);
                                }
                            }

                            FieldChange::OptionalityChanged {
                                field_name,
                                to_optional: false,
                                ..
                            } => {
                                if !row.get(field_name).map_or(true, Value::is_null) {
                                    continue;
                                }
                                if let Some(value) = target_shape
                                    .get_field(field_name)
                                    .and_then(|f| f.initial_value())
                                {
                                    row.put(field_name.clone(), value);
                                }
                            }

                            FieldChange::OptionalityChanged { .. }
                            | FieldChange::DefaultChanged { .. } => {}
                        }
                    }
                }

                if mode == ApplyMode::Custom && !retired.is_empty() {
                    legacy.fields.insert(entity_name.clone(), retired);
                }
            }
        }
    }

    let tables: Vec<String> = store.table_names().into_iter().map(String::from).collect();
    for name in tables {
        if let Some(shape) = target.get_entity(&name) {
            store.replace_shape(shape.clone())?;
        }
    }
    store.set_schema(target.version, target.structural_checksum());

    Ok(legacy)
}

/// Check every stored row against the target shapes.
pub(crate) fn validate_rows(
    store: &RecordStore,
    target: &SchemaVersion,
) -> Result<(), MigrationError> {
    for name in store.table_names() {
        let shape = target
            .get_entity(name)
            .ok_or_else(|| MigrationError::ValidationFailed {
                version: target.version,
                entity: name.to_string(),
                id: String::new(),
                reason: "entity is not part of the schema".to_string(),
            })?;

        for row in store.rows(name)? {
            check_row(shape, row).map_err(|violation| MigrationError::ValidationFailed {
                version: target.version,
                entity: name.to_string(),
                id: row.id_hex(),
                reason: violation.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Convert a value to a new field type, if that can be done without loss.
pub(crate) fn convert_value(value: Value, to: &FieldType) -> Option<Value> {
    if value.is_null() || value.conforms_to(to) {
        return Some(value);
    }
    match (value, to) {
        (Value::Int(i), FieldType::Scalar(ScalarType::Float)) => Some(Value::Float(i as f64)),
        (Value::Float(f), FieldType::Scalar(ScalarType::Int))
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
        {
            Some(Value::Int(f as i64))
        }
        (Value::Int(i), FieldType::Array(ScalarType::Int)) => Some(Value::IntArray(vec![i])),
        (Value::String(s), FieldType::Array(ScalarType::String)) => {
            Some(Value::StringArray(vec![s]))
        }
        _ => None,
    }
}
