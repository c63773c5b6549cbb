//! Core type definitions for the catalog.

use rkyv::{Archive, Deserialize, Serialize};

/// Scalar data types a field may hold.
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
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

/// Field types - flat representation without recursion.
///
/// Arrays only hold scalars. Only string and integer arrays have a stored
/// representation; other element types are rejected by [`FieldType::is_storable`].
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
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An array of scalar values.
    Array(ScalarType),
    /// An enumeration stored as its variant name.
    Enum {
        /// Name of the enum type.
        name: String,
        /// Allowed variant values.
        variants: Vec<String>,
    },
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Float)
    }

    /// Short lowercase name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Uuid => "uuid",
        }
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an array of scalars field type.
    pub fn array(scalar: ScalarType) -> Self {
        FieldType::Array(scalar)
    }

    /// Create an enum field type.
    pub fn enum_type(name: impl Into<String>, variants: &[&str]) -> Self {
        FieldType::Enum {
            name: name.into(),
            variants: variants.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Check if this type is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }

    /// Get the inner scalar type if this is a scalar-based type.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(s) | FieldType::Array(s) => Some(*s),
            FieldType::Enum { .. } => None,
        }
    }

    /// Whether values of this type can be persisted by the record store.
    pub fn is_storable(&self) -> bool {
        match self {
            FieldType::Array(s) => matches!(s, ScalarType::String | ScalarType::Int),
            _ => true,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Scalar(s) => write!(f, "{}", s.name()),
            FieldType::Array(s) => write!(f, "[{}]", s.name()),
            FieldType::Enum { name, .. } => write!(f, "enum {}", name),
        }
    }
}
