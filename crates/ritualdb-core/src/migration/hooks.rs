//! Custom stage hooks.
//!
//! A hook runs inside a custom stage, either before the structural change
//! (against the old shape) or after it (against the new shape). Post hooks
//! can read the values the change retired: removed fields, fields whose type
//! changed, and whole removed entities. Retired data is discarded once the
//! stage completes.

use super::stage::StageId;
use crate::catalog::VersionNumber;
use crate::error::Error;
use crate::store::{RecordStore, Row, RowId, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Error type hooks return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Retired field values of one row, by field name.
pub type LegacyValues = BTreeMap<String, Value>;

/// A data transform attached to a custom stage.
pub trait MigrationHook: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Run the transform.
    fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), HookError>;
}

/// A hook backed by a closure.
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&mut StageContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
{
    /// Create a hook.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Create a shared hook ready to attach to a stage.
    pub fn arc(name: impl Into<String>, f: F) -> Arc<dyn MigrationHook> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> MigrationHook for FnHook<F>
where
    F: Fn(&mut StageContext<'_>) -> Result<(), HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), HookError> {
        (self.f)(ctx)
    }
}

impl<F> fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").field("name", &self.name).finish()
    }
}

/// Values retired by a stage's structural change.
#[derive(Debug, Default)]
pub struct LegacyData {
    pub(crate) fields: BTreeMap<String, BTreeMap<RowId, LegacyValues>>,
    pub(crate) entities: BTreeMap<String, Vec<Row>>,
}

impl LegacyData {
    /// Check if nothing was retired.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.entities.is_empty()
    }

    /// Number of retired field values plus retired rows.
    pub fn len(&self) -> usize {
        let values: usize = self
            .fields
            .values()
            .flat_map(|rows| rows.values())
            .map(|v| v.len())
            .sum();
        let rows: usize = self.entities.values().map(|r| r.len()).sum();
        values + rows
    }

    /// Retired value of one field of one row.
    pub fn value(&self, entity: &str, id: &RowId, field: &str) -> Option<&Value> {
        self.values(entity, id).and_then(|v| v.get(field))
    }

    /// All retired values of one row.
    pub fn values(&self, entity: &str, id: &RowId) -> Option<&LegacyValues> {
        self.fields.get(entity).and_then(|rows| rows.get(id))
    }

    /// Rows of an entity removed by the stage.
    pub fn entity_rows(&self, entity: &str) -> Option<&[Row]> {
        self.entities.get(entity).map(|rows| rows.as_slice())
    }
}

/// What a hook sees while it runs.
pub struct StageContext<'a> {
    store: &'a mut RecordStore,
    stage: StageId,
    legacy: &'a LegacyData,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(store: &'a mut RecordStore, stage: StageId, legacy: &'a LegacyData) -> Self {
        Self {
            store,
            stage,
            legacy,
        }
    }

    /// The stage being run.
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Source version of the stage.
    pub fn from(&self) -> VersionNumber {
        self.stage.from
    }

    /// Target version of the stage.
    pub fn to(&self) -> VersionNumber {
        self.stage.to
    }

    /// Read access to the store being migrated.
    pub fn store(&self) -> &RecordStore {
        self.store
    }

    /// Check if the store holds a table for an entity.
    pub fn has_entity(&self, entity: &str) -> bool {
        self.store.has_table(entity)
    }

    /// Retired data; empty in pre hooks.
    pub fn legacy(&self) -> &LegacyData {
        self.legacy
    }

    /// Retired value of one field of one row.
    pub fn legacy_value(&self, entity: &str, id: &RowId, field: &str) -> Option<&Value> {
        self.legacy.value(entity, id, field)
    }

    /// Rows of an entity removed by the stage.
    pub fn legacy_rows(&self, entity: &str) -> &[Row] {
        self.legacy.entity_rows(entity).unwrap_or(&[])
    }

    /// Rewrite every row of an entity in place.
    ///
    /// The closure receives the row and its retired values. Returns the
    /// number of rows visited, or zero when the store does not hold the
    /// entity.
    pub fn update_rows<F>(&mut self, entity: &str, mut f: F) -> Result<usize, Error>
    where
        F: FnMut(&mut Row, &LegacyValues),
    {
        if !self.store.has_table(entity) {
            return Ok(0);
        }
        let empty = LegacyValues::new();
        let legacy = self.legacy;
        let retired = legacy.fields.get(entity);

        let mut visited = 0;
        for row in self.store.rows_mut(entity)? {
            let values = retired.and_then(|r| r.get(&row.id)).unwrap_or(&empty);
            f(row, values);
            visited += 1;
        }
        Ok(visited)
    }

    /// Add a row without validation; the stage validates every row once
    /// the post hook returns.
    pub fn insert_row(&mut self, entity: &str, row: Row) -> Result<RowId, Error> {
        let id = row.id;
        self.store.put_row(entity, row)?;
        Ok(id)
    }
}
