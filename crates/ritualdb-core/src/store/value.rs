//! Stored field values.

use crate::catalog::{FieldType, ScalarType};
use rkyv::{Archive, Deserialize, Serialize};

/// A value held by one field of a row.
///
/// Arrays are typed (`StringArray`, `IntArray`) to keep the archived
/// representation non-recursive.
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
    /// UUID as 16 bytes.
    Uuid([u8; 16]),
    /// Array of strings.
    StringArray(Vec<String>),
    /// Array of 64-bit integers.
    IntArray(Vec<i64>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as timestamp.
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Try to get as UUID.
    pub fn as_uuid(&self) -> Option<&[u8; 16]> {
        match self {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }

    /// Try to get as integer array.
    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            Value::IntArray(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as string array.
    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Value::StringArray(v) => Some(v),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::StringArray(_) => "[string]",
            Value::IntArray(_) => "[int]",
        }
    }

    /// Check whether a non-null value matches a field type.
    ///
    /// Null never conforms; optionality is decided by the field.
    pub fn conforms_to(&self, field_type: &FieldType) -> bool {
        match (field_type, self) {
            (FieldType::Scalar(scalar), value) => matches!(
                (scalar, value),
                (ScalarType::Bool, Value::Bool(_))
                    | (ScalarType::Int, Value::Int(_))
                    | (ScalarType::Float, Value::Float(_))
                    | (ScalarType::String, Value::String(_))
                    | (ScalarType::Bytes, Value::Bytes(_))
                    | (ScalarType::Timestamp, Value::Timestamp(_))
                    | (ScalarType::Uuid, Value::Uuid(_))
            ),
            (FieldType::Array(ScalarType::String), Value::StringArray(_)) => true,
            (FieldType::Array(ScalarType::Int), Value::IntArray(_)) => true,
            (FieldType::Array(_), _) => false,
            (FieldType::Enum { variants, .. }, Value::String(s)) => variants.contains(s),
            (FieldType::Enum { .. }, _) => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(t) => write!(f, "@{}", t),
            Value::Uuid(u) => write!(f, "{}", hex::encode(u)),
            Value::StringArray(v) => write!(f, "{:?}", v),
            Value::IntArray(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<[u8; 16]> for Value {
    fn from(v: [u8; 16]) -> Self {
        Value::Uuid(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::IntArray(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringArray(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(3).as_i64(), Some(3));
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("daily").as_str(), Some("daily"));
        assert_eq!(Value::Timestamp(7).as_timestamp(), Some(7));
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from(vec![1_i64, 3]).as_int_array(), Some(&[1, 3][..]));
    }

    #[test]
    fn test_conforms_to_scalars() {
        let ts = FieldType::scalar(ScalarType::Timestamp);
        assert!(Value::Timestamp(1).conforms_to(&ts));
        assert!(!Value::Int(1).conforms_to(&ts));
        assert!(!Value::Null.conforms_to(&ts));
    }

    #[test]
    fn test_conforms_to_arrays() {
        assert!(Value::IntArray(vec![]).conforms_to(&FieldType::array(ScalarType::Int)));
        assert!(!Value::StringArray(vec![]).conforms_to(&FieldType::array(ScalarType::Int)));
        assert!(!Value::IntArray(vec![]).conforms_to(&FieldType::array(ScalarType::Float)));
    }

    #[test]
    fn test_conforms_to_enum() {
        let kind = FieldType::enum_type("HabitKind", &["binary", "numeric"]);
        assert!(Value::from("binary").conforms_to(&kind));
        assert!(!Value::from("weekly").conforms_to(&kind));
        assert!(!Value::Int(0).conforms_to(&kind));
    }
}
