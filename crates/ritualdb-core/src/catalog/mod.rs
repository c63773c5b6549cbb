//! Schema catalog types.
//!
//! Entity shapes, fields, relations and the versioned snapshots built from them.

mod entity;
mod field;
mod relation;
mod schema;
mod types;
mod version;

pub use entity::{EntityShape, IDENTITY_FIELD};
pub use field::{DefaultValue, FieldDef};
pub use relation::{Cardinality, DeleteRule, RelationDef};
pub use schema::{structural_checksum, SchemaVersion, StructuralChecksum};
pub use types::{FieldType, ScalarType};
pub use version::{ParseVersionError, VersionNumber};
