//! Record store: entity tables persisted as a snapshot plus a write-ahead log.

use super::format::{
    decode_header, decode_primary, encode_frame, encode_primary, scan_wal, ShmHeader, StoreBody,
    StoreHeader, StoredRow, StoredTable, StoredValue, WalOp, WalFrame, STORE_FORMAT,
};
use super::{Row, RowId, StoreLocation, Value};
use crate::catalog::{
    DeleteRule, EntityShape, SchemaVersion, StructuralChecksum, VersionNumber, IDENTITY_FIELD,
};
use crate::error::Error;
use crate::port::FileSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which entities a store keeps tables for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Hosting {
    /// Every entity.
    #[default]
    All,
    /// Only the listed entities.
    Only(BTreeSet<String>),
    /// Every entity except the listed ones.
    Except(BTreeSet<String>),
}

impl Hosting {
    /// Host only the given entities.
    pub fn only<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Hosting::Only(entities.into_iter().map(Into::into).collect())
    }

    /// Host every entity except the given ones.
    pub fn except<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Hosting::Except(entities.into_iter().map(Into::into).collect())
    }

    /// Check whether an entity is hosted.
    pub fn hosts(&self, entity: &str) -> bool {
        match self {
            Hosting::All => true,
            Hosting::Only(set) => set.contains(entity),
            Hosting::Except(set) => !set.contains(entity),
        }
    }
}

/// Summary of a store read from its header without opening it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Schema version the store is formatted for.
    pub version: VersionNumber,
    /// Structural checksum recorded with that version.
    pub checksum: StructuralChecksum,
    /// Checkpoint generation.
    pub generation: u64,
}

impl StoreInfo {
    fn from_header(header: &StoreHeader) -> Result<Self, Error> {
        let version = header
            .version
            .parse::<VersionNumber>()
            .map_err(|e| Error::InvalidData(e.to_string()))?;
        let checksum = StructuralChecksum::from_hex(&header.checksum).ok_or_else(|| {
            Error::InvalidData(format!("invalid structural checksum '{}'", header.checksum))
        })?;
        Ok(Self {
            version,
            checksum,
            generation: header.generation,
        })
    }
}

/// Reason a row does not conform to its entity shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowViolation {
    /// A required field has no value.
    #[error("required field '{0}' is missing")]
    MissingField(String),

    /// A value names a field the shape does not declare.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// A value does not match the declared type.
    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Declared type.
        expected: String,
        /// Type of the stored value.
        found: &'static str,
    },
}

/// Check a row against an entity shape.
pub fn check_row(shape: &EntityShape, row: &Row) -> Result<(), RowViolation> {
    for field in &shape.fields {
        if field.name == IDENTITY_FIELD {
            continue;
        }
        match row.get(&field.name) {
            None => return Err(RowViolation::MissingField(field.name.clone())),
            Some(value) if !field.accepts(value) => {
                return Err(if value.is_null() {
                    RowViolation::MissingField(field.name.clone())
                } else {
                    RowViolation::TypeMismatch {
                        field: field.name.clone(),
                        expected: field.field_type.to_string(),
                        found: value.type_name(),
                    }
                });
            }
            Some(_) => {}
        }
    }

    if let Some(name) = row.values.keys().find(|name| shape.get_field(name).is_none()) {
        return Err(RowViolation::UnknownField(name.clone()));
    }
    Ok(())
}

/// Fill missing fields from their initial values.
fn fill_defaults(shape: &EntityShape, row: &mut Row) {
    for field in &shape.fields {
        if field.name == IDENTITY_FIELD || row.values.contains_key(&field.name) {
            continue;
        }
        if let Some(value) = field.initial_value() {
            row.values.insert(field.name.clone(), value);
        }
    }
}

#[derive(Debug, Clone)]
struct Table {
    shape: EntityShape,
    rows: BTreeMap<RowId, Row>,
}

impl Table {
    fn new(shape: EntityShape) -> Self {
        Self {
            shape,
            rows: BTreeMap::new(),
        }
    }

    fn from_stored(stored: StoredTable) -> Self {
        Self {
            shape: stored.shape,
            rows: stored
                .rows
                .into_iter()
                .map(|r| (r.id, row_from_stored(r)))
                .collect(),
        }
    }

    fn to_stored(&self) -> StoredTable {
        StoredTable {
            shape: self.shape.clone(),
            rows: self.rows.values().map(row_to_stored).collect(),
        }
    }
}

fn row_to_stored(row: &Row) -> StoredRow {
    StoredRow {
        id: row.id,
        values: row
            .values
            .iter()
            .map(|(name, value)| StoredValue {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
    }
}

fn row_from_stored(stored: StoredRow) -> Row {
    Row {
        id: stored.id,
        values: stored
            .values
            .into_iter()
            .map(|v| (v.name, v.value))
            .collect(),
    }
}

/// Exclusive in-process hold on a store's primary path.
#[derive(Debug)]
struct StoreLock {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl StoreLock {
    fn acquire(fs: &Arc<dyn FileSystem>, path: PathBuf) -> Result<Self, Error> {
        if !fs.try_lock(&path) {
            return Err(Error::StoreLocked(path));
        }
        Ok(Self {
            fs: Arc::clone(fs),
            path,
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        self.fs.unlock(&self.path);
        debug!(path = %self.path.display(), "Released store lock");
    }
}

/// An opened record store.
///
/// Holds every hosted table in memory. Repository mutations are appended to
/// the write-ahead log and become part of the snapshot on [`RecordStore::checkpoint`].
/// Structural changes made by the migration engine are only persisted by a
/// checkpoint.
#[derive(Debug)]
pub struct RecordStore {
    fs: Arc<dyn FileSystem>,
    location: StoreLocation,
    version: VersionNumber,
    checksum: StructuralChecksum,
    generation: u64,
    tables: BTreeMap<String, Table>,
    hosting: Hosting,
    wal_frames: u64,
    wal_len: u64,
    _lock: StoreLock,
}

impl RecordStore {
    /// Create a new store formatted for `schema`, with tables for every
    /// hosted entity.
    pub fn create(
        fs: Arc<dyn FileSystem>,
        location: StoreLocation,
        schema: &SchemaVersion,
        hosting: Hosting,
    ) -> Result<Self, Error> {
        let primary = location.primary_path();
        if fs.exists(&primary) {
            return Err(Error::StoreExists(primary));
        }
        fs.create_dir_all(location.directory())?;
        let lock = StoreLock::acquire(&fs, primary.clone())?;

        let tables = schema
            .entities
            .values()
            .filter(|shape| hosting.hosts(&shape.name))
            .map(|shape| (shape.name.clone(), Table::new(shape.clone())))
            .collect();

        let mut store = Self {
            fs,
            location,
            version: schema.version,
            checksum: schema.structural_checksum(),
            generation: 0,
            tables,
            hosting,
            wal_frames: 0,
            wal_len: 0,
            _lock: lock,
        };
        store.checkpoint()?;

        info!(
            path = %primary.display(),
            version = %store.version,
            tables = store.tables.len(),
            "Created store"
        );
        Ok(store)
    }

    /// Open an existing store, replaying its write-ahead log.
    pub fn open(fs: Arc<dyn FileSystem>, location: StoreLocation) -> Result<Self, Error> {
        let primary = location.primary_path();
        if !fs.exists(&primary) {
            return Err(Error::StoreNotFound(primary));
        }
        let lock = StoreLock::acquire(&fs, primary.clone())?;

        let (header, body) = decode_primary(&fs.read(&primary)?)?;
        let info = StoreInfo::from_header(&header)?;
        let tables = body
            .tables
            .into_iter()
            .map(|stored| {
                let table = Table::from_stored(stored);
                (table.shape.name.clone(), table)
            })
            .collect();

        let mut store = Self {
            fs,
            location,
            version: info.version,
            checksum: info.checksum,
            generation: info.generation,
            tables,
            hosting: Hosting::All,
            wal_frames: 0,
            wal_len: 0,
            _lock: lock,
        };
        store.recover_wal()?;

        debug!(
            path = %primary.display(),
            version = %store.version,
            generation = store.generation,
            "Opened store"
        );
        Ok(store)
    }

    /// Check whether a store exists at a location.
    pub fn exists(fs: &dyn FileSystem, location: &StoreLocation) -> bool {
        fs.exists(&location.primary_path())
    }

    /// Read a store's header without opening or locking it.
    pub fn inspect(fs: &dyn FileSystem, location: &StoreLocation) -> Result<StoreInfo, Error> {
        let primary = location.primary_path();
        if !fs.exists(&primary) {
            return Err(Error::StoreNotFound(primary));
        }
        StoreInfo::from_header(&decode_header(&fs.read(&primary)?)?)
    }

    /// Store location.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Schema version the store is formatted for.
    pub fn version(&self) -> VersionNumber {
        self.version
    }

    /// Structural checksum recorded with the version.
    pub fn checksum(&self) -> StructuralChecksum {
        self.checksum
    }

    /// Current checkpoint generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of frames in the write-ahead log.
    pub fn wal_frames(&self) -> u64 {
        self.wal_frames
    }

    /// Hosting filter applied to newly added entities.
    pub fn hosting(&self) -> &Hosting {
        &self.hosting
    }

    /// Replace the hosting filter.
    pub fn set_hosting(&mut self, hosting: Hosting) {
        self.hosting = hosting;
    }

    /// Check whether the hosting filter admits an entity.
    pub fn hosts(&self, entity: &str) -> bool {
        self.hosting.hosts(entity)
    }

    /// Check whether the store has a table for an entity.
    pub fn has_table(&self, entity: &str) -> bool {
        self.tables.contains_key(entity)
    }

    /// Shape of a stored entity.
    pub fn shape(&self, entity: &str) -> Option<&EntityShape> {
        self.tables.get(entity).map(|t| &t.shape)
    }

    /// Shapes of every stored entity, in name order.
    pub fn shapes(&self) -> impl Iterator<Item = &EntityShape> {
        self.tables.values().map(|t| &t.shape)
    }

    /// Names of every stored entity.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// The stored shapes as a schema version.
    pub fn schema(&self) -> SchemaVersion {
        SchemaVersion::with_entities(self.version, self.shapes().cloned())
    }

    // Repository operations

    /// Insert a row, filling unset fields with their defaults.
    pub fn insert(&mut self, entity: &str, mut row: Row) -> Result<RowId, Error> {
        let table = self.table(entity)?;
        if table.rows.contains_key(&row.id) {
            return Err(Error::InvalidData(format!(
                "duplicate {} id {}",
                entity,
                row.id_hex()
            )));
        }
        row.values.remove(IDENTITY_FIELD);
        fill_defaults(&table.shape, &mut row);
        check_row(&table.shape, &row)
            .map_err(|v| Error::InvalidData(format!("{}: {}", entity, v)))?;

        let id = row.id;
        self.log(WalOp::Put {
            entity: entity.to_string(),
            row: row_to_stored(&row),
        })?;
        self.table_mut(entity)?.rows.insert(id, row);
        Ok(id)
    }

    /// Overwrite the given fields of an existing row.
    pub fn update(&mut self, entity: &str, row: Row) -> Result<(), Error> {
        let table = self.table(entity)?;
        let mut merged = table
            .rows
            .get(&row.id)
            .cloned()
            .ok_or_else(|| Error::RecordNotFound {
                entity: entity.to_string(),
                id: row.id_hex(),
            })?;
        for (name, value) in row.values {
            if name != IDENTITY_FIELD {
                merged.values.insert(name, value);
            }
        }
        check_row(&table.shape, &merged)
            .map_err(|v| Error::InvalidData(format!("{}: {}", entity, v)))?;

        self.log(WalOp::Put {
            entity: entity.to_string(),
            row: row_to_stored(&merged),
        })?;
        self.table_mut(entity)?.rows.insert(merged.id, merged);
        Ok(())
    }

    /// Delete a row and apply the delete rules of its relations.
    ///
    /// Returns the number of rows removed, cascades included.
    pub fn delete(&mut self, entity: &str, id: &RowId) -> Result<usize, Error> {
        if !self.table(entity)?.rows.contains_key(id) {
            return Err(Error::RecordNotFound {
                entity: entity.to_string(),
                id: hex::encode(id),
            });
        }

        let mut removed = 0;
        let mut pending = vec![(entity.to_string(), *id)];
        while let Some((entity, id)) = pending.pop() {
            let Some(table) = self.tables.get(&entity) else {
                continue;
            };
            if !table.rows.contains_key(&id) {
                continue;
            }

            for relation in table.shape.relations.clone() {
                let Some(target) = self.tables.get(&relation.target) else {
                    continue;
                };
                let owner = Value::Uuid(id);
                let dependents: Vec<RowId> = target
                    .rows
                    .values()
                    .filter(|r| r.get(&relation.foreign_field) == Some(&owner))
                    .map(|r| r.id)
                    .collect();

                for dependent in dependents {
                    match relation.on_delete {
                        DeleteRule::Cascade => pending.push((relation.target.clone(), dependent)),
                        DeleteRule::Nullify => {
                            let Some(row) = self
                                .tables
                                .get_mut(&relation.target)
                                .and_then(|t| t.rows.get_mut(&dependent))
                            else {
                                continue;
                            };
                            row.put(relation.foreign_field.clone(), Value::Null);
                            let stored = row_to_stored(row);
                            self.log(WalOp::Put {
                                entity: relation.target.clone(),
                                row: stored,
                            })?;
                        }
                    }
                }
            }

            self.log(WalOp::Delete {
                entity: entity.clone(),
                id,
            })?;
            if let Some(table) = self.tables.get_mut(&entity) {
                table.rows.remove(&id);
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Get a row by id.
    pub fn get(&self, entity: &str, id: &RowId) -> Result<Option<&Row>, Error> {
        Ok(self.table(entity)?.rows.get(id))
    }

    /// All rows of an entity, in id order.
    pub fn rows(&self, entity: &str) -> Result<Vec<&Row>, Error> {
        Ok(self.table(entity)?.rows.values().collect())
    }

    /// Number of rows of an entity.
    pub fn count(&self, entity: &str) -> Result<usize, Error> {
        Ok(self.table(entity)?.rows.len())
    }

    /// Move an entity's table into another store, merging rows by id.
    ///
    /// Both stores are checkpointed; the target first, so an interrupted
    /// move leaves the rows in both places and a retry converges.
    pub fn relocate_table(&mut self, entity: &str, target: &mut RecordStore) -> Result<usize, Error> {
        let Some(table) = self.tables.get(entity) else {
            return Ok(0);
        };
        let moved = table.rows.len();

        match target.tables.get_mut(entity) {
            Some(existing) => {
                for (id, row) in &table.rows {
                    existing.rows.insert(*id, row.clone());
                }
            }
            None => {
                target.tables.insert(entity.to_string(), table.clone());
            }
        }
        target.checkpoint()?;

        self.tables.remove(entity);
        self.checkpoint()?;

        info!(
            entity,
            rows = moved,
            from = %self.location.name(),
            to = %target.location.name(),
            "Relocated table"
        );
        Ok(moved)
    }

    /// Write the in-memory state as a new snapshot and reset the log.
    pub fn checkpoint(&mut self) -> Result<(), Error> {
        let generation = self.generation + 1;
        let header = StoreHeader {
            format: STORE_FORMAT,
            version: self.version.to_string(),
            checksum: self.checksum.to_hex(),
            generation,
        };
        let body = StoreBody {
            tables: self.tables.values().map(Table::to_stored).collect(),
        };
        self.fs
            .write(&self.location.primary_path(), &encode_primary(&header, &body)?)?;
        self.generation = generation;

        self.fs.write(&self.location.wal_path(), &[])?;
        self.wal_frames = 0;
        self.wal_len = 0;
        self.write_shm()?;

        debug!(
            store = %self.location.name(),
            generation,
            "Checkpointed store"
        );
        Ok(())
    }

    // Engine operations. None of these are logged; the engine checkpoints
    // after each stage.

    pub(crate) fn set_schema(&mut self, version: VersionNumber, checksum: StructuralChecksum) {
        self.version = version;
        self.checksum = checksum;
    }

    pub(crate) fn create_table(&mut self, shape: EntityShape) {
        self.tables
            .entry(shape.name.clone())
            .or_insert_with(|| Table::new(shape));
    }

    pub(crate) fn drop_table(&mut self, entity: &str) -> Option<(EntityShape, Vec<Row>)> {
        self.tables
            .remove(entity)
            .map(|t| (t.shape, t.rows.into_values().collect()))
    }

    pub(crate) fn replace_shape(&mut self, shape: EntityShape) -> Result<(), Error> {
        let table = self.table_mut(&shape.name)?;
        table.shape = shape;
        Ok(())
    }

    pub(crate) fn rows_mut(
        &mut self,
        entity: &str,
    ) -> Result<impl Iterator<Item = &mut Row>, Error> {
        Ok(self.table_mut(entity)?.rows.values_mut())
    }

    pub(crate) fn put_row(&mut self, entity: &str, row: Row) -> Result<(), Error> {
        self.table_mut(entity)?.rows.insert(row.id, row);
        Ok(())
    }

    // Internals

    fn table(&self, entity: &str) -> Result<&Table, Error> {
        self.tables
            .get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    fn table_mut(&mut self, entity: &str) -> Result<&mut Table, Error> {
        self.tables
            .get_mut(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    fn log(&mut self, op: WalOp) -> Result<(), Error> {
        let frame = WalFrame {
            generation: self.generation,
            sequence: self.wal_frames,
            op,
        };
        let bytes = encode_frame(&frame)?;
        self.fs.append(&self.location.wal_path(), &bytes)?;
        self.wal_frames += 1;
        self.wal_len += bytes.len() as u64;
        self.write_shm()
    }

    fn read_shm(&self) -> Option<ShmHeader> {
        let bytes = self.fs.read(&self.location.shm_path()).ok()?;
        ShmHeader::from_bytes(&bytes).ok()
    }

    fn write_shm(&self) -> Result<(), Error> {
        let shm = ShmHeader {
            generation: self.generation,
            frames: self.wal_frames,
            wal_len: self.wal_len,
        };
        self.fs.write(&self.location.shm_path(), &shm.to_bytes()?)?;
        Ok(())
    }

    fn recover_wal(&mut self) -> Result<(), Error> {
        let wal_path = self.location.wal_path();
        let wal = if self.fs.exists(&wal_path) {
            self.fs.read(&wal_path)?
        } else {
            Vec::new()
        };

        let committed = self
            .read_shm()
            .filter(|shm| shm.generation == self.generation)
            .map(|shm| shm.wal_len);

        let scan = scan_wal(&wal);
        let mut applied = 0u64;
        let mut end = 0u64;
        for (frame, frame_end) in scan.frames {
            if frame.generation != self.generation {
                break;
            }
            if committed.is_some_and(|len| frame_end > len) {
                break;
            }
            self.apply_frame(frame.op);
            applied += 1;
            end = frame_end;
        }

        if end < wal.len() as u64 {
            warn!(
                path = %wal_path.display(),
                valid_len = end,
                file_len = wal.len(),
                "Truncating write-ahead log tail"
            );
            self.fs.truncate(&wal_path, end)?;
        }

        self.wal_frames = applied;
        self.wal_len = end;
        self.write_shm()?;

        if applied > 0 {
            info!(store = %self.location.name(), frames = applied, "Replayed write-ahead log");
        }
        Ok(())
    }

    fn apply_frame(&mut self, op: WalOp) {
        match op {
            WalOp::Put { entity, row } => match self.tables.get_mut(&entity) {
                Some(table) => {
                    let row = row_from_stored(row);
                    table.rows.insert(row.id, row);
                }
                None => warn!(entity = %entity, "Skipping logged row for unknown entity"),
            },
            WalOp::Delete { entity, id } => {
                if let Some(table) = self.tables.get_mut(&entity) {
                    table.rows.remove(&id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DefaultValue, FieldDef, FieldType, RelationDef, ScalarType};
    use crate::port::MemoryFileSystem;

    fn sample_schema() -> SchemaVersion {
        SchemaVersion::new(VersionNumber::new(1, 0, 0))
            .with_entity(
                EntityShape::new("Habit")
                    .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
                    .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
                    .with_field(
                        FieldDef::new("isActive", FieldType::scalar(ScalarType::Bool))
                            .with_default(DefaultValue::Bool(true)),
                    )
                    .with_relation(
                        RelationDef::to_many("logs", "HabitLog", "habitId")
                            .with_on_delete(DeleteRule::Cascade),
                    )
                    .with_relation(RelationDef::to_many("notes", "Note", "habitId")),
            )
            .with_entity(
                EntityShape::new("HabitLog")
                    .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
                    .with_field(FieldDef::new("habitId", FieldType::scalar(ScalarType::Uuid))),
            )
            .with_entity(
                EntityShape::new("Note")
                    .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
                    .with_field(FieldDef::optional(
                        "habitId",
                        FieldType::scalar(ScalarType::Uuid),
                    )),
            )
    }

    fn setup() -> (Arc<dyn FileSystem>, StoreLocation) {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFileSystem::new());
        (fs, StoreLocation::new("/data", "Ritualist"))
    }

    #[test]
    fn test_create_and_reopen() {
        let (fs, location) = setup();
        let schema = sample_schema();

        let mut store =
            RecordStore::create(fs.clone(), location.clone(), &schema, Hosting::All).unwrap();
        let id = store.insert("Habit", Row::new().set("name", "Read")).unwrap();
        assert_eq!(store.wal_frames(), 1);
        drop(store);

        let store = RecordStore::open(fs.clone(), location.clone()).unwrap();
        assert_eq!(store.version(), VersionNumber::new(1, 0, 0));
        assert_eq!(store.checksum(), schema.structural_checksum());
        let row = store.get("Habit", &id).unwrap().unwrap();
        assert_eq!(row.get("isActive"), Some(&Value::Bool(true)));
        assert!(store.schema().same_structure(&schema));
    }

    #[test]
    fn test_store_lock() {
        let (fs, location) = setup();
        let store =
            RecordStore::create(fs.clone(), location.clone(), &sample_schema(), Hosting::All)
                .unwrap();

        assert!(matches!(
            RecordStore::open(fs.clone(), location.clone()),
            Err(Error::StoreLocked(_))
        ));
        drop(store);
        assert!(RecordStore::open(fs, location).is_ok());
    }

    #[test]
    fn test_create_refuses_existing() {
        let (fs, location) = setup();
        drop(RecordStore::create(fs.clone(), location.clone(), &sample_schema(), Hosting::All));

        assert!(matches!(
            RecordStore::create(fs, location, &sample_schema(), Hosting::All),
            Err(Error::StoreExists(_))
        ));
    }

    #[test]
    fn test_insert_validates() {
        let (fs, location) = setup();
        let mut store =
            RecordStore::create(fs, location, &sample_schema(), Hosting::All).unwrap();

        let missing = store.insert("Habit", Row::new());
        assert!(matches!(missing, Err(Error::InvalidData(_))));

        let wrong_type = store.insert("Habit", Row::new().set("name", 5_i64));
        assert!(matches!(wrong_type, Err(Error::InvalidData(_))));

        let unknown = store.insert("Habit", Row::new().set("name", "a").set("color", "red"));
        assert!(matches!(unknown, Err(Error::InvalidData(_))));

        assert!(matches!(
            store.insert("Goal", Row::new()),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_update() {
        let (fs, location) = setup();
        let mut store =
            RecordStore::create(fs, location, &sample_schema(), Hosting::All).unwrap();
        let id = store.insert("Habit", Row::new().set("name", "Read")).unwrap();

        store
            .update("Habit", Row::with_id(id).set("isActive", false))
            .unwrap();
        let row = store.get("Habit", &id).unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&Value::String("Read".into())));
        assert_eq!(row.get("isActive"), Some(&Value::Bool(false)));

        assert!(matches!(
            store.update("Habit", Row::new().set("name", "x")),
            Err(Error::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_rules() {
        let (fs, location) = setup();
        let mut store =
            RecordStore::create(fs.clone(), location.clone(), &sample_schema(), Hosting::All)
                .unwrap();
        let habit = store.insert("Habit", Row::new().set("name", "Run")).unwrap();
        store
            .insert("HabitLog", Row::new().set("habitId", habit))
            .unwrap();
        store
            .insert("HabitLog", Row::new().set("habitId", habit))
            .unwrap();
        let note = store.insert("Note", Row::new().set("habitId", habit)).unwrap();

        assert_eq!(store.delete("Habit", &habit).unwrap(), 3);
        assert_eq!(store.count("HabitLog").unwrap(), 0);
        assert_eq!(
            store.get("Note", &note).unwrap().unwrap().get("habitId"),
            Some(&Value::Null)
        );
        drop(store);

        let store = RecordStore::open(fs, location).unwrap();
        assert_eq!(store.count("Habit").unwrap(), 0);
        assert_eq!(store.count("Note").unwrap(), 1);
    }

    #[test]
    fn test_checkpoint_resets_wal() {
        let (fs, location) = setup();
        let mut store =
            RecordStore::create(fs.clone(), location.clone(), &sample_schema(), Hosting::All)
                .unwrap();
        store.insert("Habit", Row::new().set("name", "Read")).unwrap();
        let generation = store.generation();

        store.checkpoint().unwrap();
        assert_eq!(store.generation(), generation + 1);
        assert_eq!(store.wal_frames(), 0);
        assert_eq!(fs.len(&location.wal_path()).unwrap(), 0);
    }

    #[test]
    fn test_torn_wal_tail_truncated() {
        let (fs, location) = setup();
        let mut store =
            RecordStore::create(fs.clone(), location.clone(), &sample_schema(), Hosting::All)
                .unwrap();
        store.insert("Habit", Row::new().set("name", "Read")).unwrap();
        drop(store);

        let committed = fs.len(&location.wal_path()).unwrap();
        fs.append(&location.wal_path(), &[9, 0, 0, 0, 1, 2]).unwrap();

        let store = RecordStore::open(fs.clone(), location.clone()).unwrap();
        assert_eq!(store.count("Habit").unwrap(), 1);
        assert_eq!(fs.len(&location.wal_path()).unwrap(), committed);
    }

    #[test]
    fn test_frames_beyond_shm_are_dropped() {
        let (fs, location) = setup();
        let mut store =
            RecordStore::create(fs.clone(), location.clone(), &sample_schema(), Hosting::All)
                .unwrap();
        store.insert("Habit", Row::new().set("name", "Read")).unwrap();
        let shm = fs.read(&location.shm_path()).unwrap();
        store.insert("Habit", Row::new().set("name", "Walk")).unwrap();
        drop(store);

        // Simulate a crash between the WAL append and the SHM update.
        fs.write(&location.shm_path(), &shm).unwrap();

        let store = RecordStore::open(fs, location).unwrap();
        assert_eq!(store.count("Habit").unwrap(), 1);
        assert_eq!(store.wal_frames(), 1);
    }

    #[test]
    fn test_hosting_filters_tables() {
        let (fs, location) = setup();
        let store = RecordStore::create(
            fs,
            location,
            &sample_schema(),
            Hosting::except(["Note"]),
        )
        .unwrap();

        assert!(store.has_table("Habit"));
        assert!(!store.has_table("Note"));
        assert!(!store.hosts("Note"));
    }

    #[test]
    fn test_relocate_table() {
        let (fs, _) = setup();
        let shared_location = StoreLocation::new("/data", "Ritualist");
        let private_location = StoreLocation::new("/data", "Private");
        let mut shared = RecordStore::create(
            fs.clone(),
            shared_location.clone(),
            &sample_schema(),
            Hosting::All,
        )
        .unwrap();
        let mut private = RecordStore::create(
            fs.clone(),
            private_location,
            &sample_schema(),
            Hosting::only(["Note"]),
        )
        .unwrap();
        shared.insert("Note", Row::new()).unwrap();

        assert_eq!(shared.relocate_table("Note", &mut private).unwrap(), 1);
        assert!(!shared.has_table("Note"));
        assert_eq!(private.count("Note").unwrap(), 1);
        assert_eq!(shared.relocate_table("Note", &mut private).unwrap(), 0);

        drop(shared);
        let reopened = RecordStore::open(fs, shared_location).unwrap();
        assert!(!reopened.has_table("Note"));
    }

    #[test]
    fn test_inspect() {
        let (fs, location) = setup();
        assert!(matches!(
            RecordStore::inspect(fs.as_ref(), &location),
            Err(Error::StoreNotFound(_))
        ));
        let _store =
            RecordStore::create(fs.clone(), location.clone(), &sample_schema(), Hosting::All)
                .unwrap();

        let info = RecordStore::inspect(fs.as_ref(), &location).unwrap();
        assert_eq!(info.version, VersionNumber::new(1, 0, 0));
        assert_eq!(info.generation, 1);
    }
}
