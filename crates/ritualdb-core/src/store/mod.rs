//! Record store.
//!
//! The physical store the migration engine walks: entity tables held in a
//! primary snapshot file, with a write-ahead log and a shared header as
//! companion files.

mod format;
mod location;
mod record_store;
mod row;
mod value;

pub use format::{ShmHeader, StoreHeader, STORE_FORMAT};
pub use location::{companion_of, StoreLocation, COMPANION_SUFFIXES, STORE_EXTENSION};
pub use record_store::{check_row, Hosting, RecordStore, RowViolation, StoreInfo};
pub use row::{current_timestamp, generate_id, Row, RowId};
pub use value::Value;
