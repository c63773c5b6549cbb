//! Schema version - one snapshot of every entity shape valid at a point in history.

use super::{EntityShape, VersionNumber};
use std::collections::BTreeMap;
use std::fmt;

/// Fingerprint of a schema version's shape.
///
/// A blake3 digest over the normalized entity shapes. The version number is
/// not part of the input, so two versions with identical shapes collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructuralChecksum([u8; 32]);

impl StructuralChecksum {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex-encoded checksum.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let digest: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(digest))
    }

    /// First eight hex characters, for logs and tables.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for StructuralChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for StructuralChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructuralChecksum({})", self.short())
    }
}

/// A versioned snapshot of all entity shapes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SchemaVersion {
    /// Version number.
    pub version: VersionNumber,
    /// Entity shapes keyed by name.
    pub entities: BTreeMap<String, EntityShape>,
}

impl SchemaVersion {
    /// Create an empty schema version.
    pub fn new(version: VersionNumber) -> Self {
        Self {
            version,
            entities: BTreeMap::new(),
        }
    }

    /// Create a schema version from a set of shapes.
    pub fn with_entities(
        version: VersionNumber,
        entities: impl IntoIterator<Item = EntityShape>,
    ) -> Self {
        Self {
            version,
            entities: entities.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityShape) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityShape> {
        self.entities.get(name)
    }

    /// List all entity names in sorted order.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    /// Compute the structural checksum of this version.
    pub fn structural_checksum(&self) -> StructuralChecksum {
        structural_checksum(self.entities.values())
    }

    /// Structural equality ignoring version numbers and declaration order.
    pub fn same_structure(&self, other: &SchemaVersion) -> bool {
        self.entities.len() == other.entities.len()
            && self.entities.iter().all(|(name, shape)| {
                other
                    .entities
                    .get(name)
                    .is_some_and(|o| o.same_structure(shape))
            })
    }
}

/// Checksum an arbitrary set of shapes.
pub fn structural_checksum<'a>(
    shapes: impl IntoIterator<Item = &'a EntityShape>,
) -> StructuralChecksum {
    let mut normalized: Vec<EntityShape> = shapes.into_iter().map(|s| s.normalized()).collect();
    normalized.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = blake3::Hasher::new();
    for shape in &normalized {
        // Shapes are plain data; encoding cannot fail.
        let encoded = serde_json::to_vec(shape).unwrap_or_default();
        hasher.update(&(encoded.len() as u64).to_le_bytes());
        hasher.update(&encoded);
    }
    StructuralChecksum(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, FieldType, ScalarType};

    fn habit() -> EntityShape {
        EntityShape::new("Habit")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
    }

    #[test]
    fn test_get_entity() {
        let schema = SchemaVersion::new(VersionNumber::new(1, 0, 0)).with_entity(habit());

        assert!(schema.get_entity("Habit").is_some());
        assert!(schema.get_entity("NonExistent").is_none());
        assert_eq!(schema.entity_names(), vec!["Habit"]);
    }

    #[test]
    fn test_checksum_ignores_version_number() {
        let a = SchemaVersion::new(VersionNumber::new(1, 0, 0)).with_entity(habit());
        let b = SchemaVersion::new(VersionNumber::new(2, 0, 0)).with_entity(habit());

        assert_eq!(a.structural_checksum(), b.structural_checksum());
        assert!(a.same_structure(&b));
    }

    #[test]
    fn test_checksum_changes_with_shape() {
        let a = SchemaVersion::new(VersionNumber::new(1, 0, 0)).with_entity(habit());
        let b = SchemaVersion::new(VersionNumber::new(2, 0, 0)).with_entity(habit().with_field(
            FieldDef::optional("archivedAt", FieldType::scalar(ScalarType::Timestamp)),
        ));

        assert_ne!(a.structural_checksum(), b.structural_checksum());
        assert!(!a.same_structure(&b));
    }

    #[test]
    fn test_checksum_hex_roundtrip() {
        let checksum = SchemaVersion::new(VersionNumber::new(1, 0, 0))
            .with_entity(habit())
            .structural_checksum();
        let hex = checksum.to_hex();

        assert_eq!(hex.len(), 64);
        assert_eq!(StructuralChecksum::from_hex(&hex), Some(checksum));
        assert!(StructuralChecksum::from_hex("abc").is_none());
        assert!(hex.starts_with(&checksum.short()));
    }
}
