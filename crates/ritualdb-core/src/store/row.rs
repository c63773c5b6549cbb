//! Rows and row identifiers.

use super::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 16-byte row identifier.
pub type RowId = [u8; 16];

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Generate a new row id with UUID v4 layout.
pub fn generate_id() -> RowId {
    // Counter to ensure uniqueness even with same timestamp
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    let mut id = [0u8; 16];
    id[..8].copy_from_slice(&now.to_le_bytes());
    id[8..16].copy_from_slice(&counter.to_le_bytes());

    id[6] = (id[6] & 0x0f) | 0x40;
    id[8] = (id[8] & 0x3f) | 0x80;

    id
}

/// One row of an entity table.
///
/// The identity field is carried in `id`; `values` never contains it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// Row id.
    pub id: RowId,
    /// Field values keyed by field name.
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row with a fresh id.
    pub fn new() -> Self {
        Self::with_id(generate_id())
    }

    /// Create an empty row with the given id.
    pub fn with_id(id: RowId) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
        }
    }

    /// Set a field value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Insert or replace a field value in place.
    pub fn put(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// Remove a field value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Hex-encoded id.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a[6] & 0xf0, 0x40);
    }

    #[test]
    fn test_row_builder() {
        let mut row = Row::new().set("name", "Read").set("displayOrder", 2_i64);
        assert_eq!(row.get("name"), Some(&Value::String("Read".into())));

        row.put("displayOrder", 3_i64);
        assert_eq!(row.get("displayOrder"), Some(&Value::Int(3)));
        assert_eq!(row.remove("name"), Some(Value::String("Read".into())));
        assert_eq!(row.id_hex().len(), 32);
    }
}
