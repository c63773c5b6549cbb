//! Field definitions for entities.

use super::types::FieldType;
use crate::store::{current_timestamp, Value};
use rkyv::{Archive, Deserialize, Serialize};

/// A field definition within an entity.
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field may hold null.
    pub optional: bool,
    /// Default value used when a row does not provide one.
    pub default: Option<DefaultValue>,
}

/// Default value for a field.
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub enum DefaultValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Timestamp in microseconds since Unix epoch.
    Timestamp(i64),
    /// Current timestamp (evaluated when the default is applied).
    CurrentTimestamp,
    /// Empty array of the field's element type.
    EmptyArray,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
            default: None,
        }
    }

    /// Create an optional field.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: true,
            default: None,
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Value a row receives for this field when it has none.
    ///
    /// Optional fields without a default start as null; required fields
    /// without a default have no initial value.
    pub fn initial_value(&self) -> Option<Value> {
        match &self.default {
            Some(default) => Some(default.to_value(&self.field_type)),
            None if self.optional => Some(Value::Null),
            None => None,
        }
    }

    /// Check whether a value is acceptable for this field.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.optional;
        }
        value.conforms_to(&self.field_type)
    }
}

impl DefaultValue {
    /// Materialize the default as a stored value.
    pub fn to_value(&self, field_type: &FieldType) -> Value {
        match self {
            DefaultValue::Null => Value::Null,
            DefaultValue::Bool(b) => Value::Bool(*b),
            DefaultValue::Int(i) => Value::Int(*i),
            DefaultValue::Float(f) => Value::Float(*f),
            DefaultValue::String(s) => Value::String(s.clone()),
            DefaultValue::Timestamp(ts) => Value::Timestamp(*ts),
            DefaultValue::CurrentTimestamp => Value::Timestamp(current_timestamp() as i64),
            DefaultValue::EmptyArray => match field_type.scalar_type() {
                Some(crate::catalog::ScalarType::Int) => Value::IntArray(Vec::new()),
                _ => Value::StringArray(Vec::new()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::ScalarType;

    #[test]
    fn test_field_def_builder() {
        let field = FieldDef::new("colorHex", FieldType::scalar(ScalarType::String))
            .with_default(DefaultValue::String("#2DA9E3".into()));

        assert_eq!(field.name, "colorHex");
        assert!(!field.optional);
        assert!(field.has_default());
        assert_eq!(
            field.initial_value(),
            Some(Value::String("#2DA9E3".into()))
        );
    }

    #[test]
    fn test_optional_field_starts_null() {
        let field = FieldDef::optional("archivedAt", FieldType::scalar(ScalarType::Timestamp));

        assert!(field.optional);
        assert!(!field.has_default());
        assert_eq!(field.initial_value(), Some(Value::Null));
        assert!(field.accepts(&Value::Null));
    }

    #[test]
    fn test_required_field_without_default() {
        let field = FieldDef::new("startDate", FieldType::scalar(ScalarType::Timestamp));

        assert_eq!(field.initial_value(), None);
        assert!(!field.accepts(&Value::Null));
        assert!(field.accepts(&Value::Timestamp(10)));
        assert!(!field.accepts(&Value::String("yesterday".into())));
    }

    #[test]
    fn test_empty_array_default_matches_element_type() {
        let days = FieldDef::new("scheduleDays", FieldType::array(ScalarType::Int))
            .with_default(DefaultValue::EmptyArray);
        assert_eq!(days.initial_value(), Some(Value::IntArray(Vec::new())));

        let reminders = FieldDef::new("reminders", FieldType::array(ScalarType::String))
            .with_default(DefaultValue::EmptyArray);
        assert_eq!(reminders.initial_value(), Some(Value::StringArray(Vec::new())));
    }
}
