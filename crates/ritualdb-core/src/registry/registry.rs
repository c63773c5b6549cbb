//! The ordered schema version registry.

use super::{RegistryError, SchemaChange};
use crate::catalog::{EntityShape, SchemaVersion, StructuralChecksum, VersionNumber};
use std::collections::BTreeMap;

/// The changes that lead from the previous version to `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionStep {
    /// Version this step produces.
    pub version: VersionNumber,
    /// Release note style description.
    pub description: String,
    /// Changes applied in order.
    pub changes: Vec<SchemaChange>,
}

impl VersionStep {
    /// Create an empty step.
    pub fn new(version: VersionNumber, description: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            changes: Vec::new(),
        }
    }

    /// Append a change.
    pub fn with_change(mut self, change: SchemaChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Append several changes.
    pub fn with_changes(mut self, changes: impl IntoIterator<Item = SchemaChange>) -> Self {
        self.changes.extend(changes);
        self
    }
}

/// Ordered, append-only catalog of schema versions.
///
/// Built from the current entity shapes plus the steps that produced them.
/// Older versions are derived by replaying each step's inverse backward, and
/// cached. The registry always holds at least the baseline version.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    steps: Vec<VersionStep>,
    versions: Vec<SchemaVersion>,
    checksums: Vec<StructuralChecksum>,
}

impl SchemaRegistry {
    /// Build a registry.
    ///
    /// `current` holds the shapes of the newest version; `baseline` names the
    /// first version, which the first step builds on.
    pub fn new(
        current: impl IntoIterator<Item = EntityShape>,
        baseline: VersionNumber,
        steps: Vec<VersionStep>,
    ) -> Result<Self, RegistryError> {
        let mut shapes: BTreeMap<String, EntityShape> =
            current.into_iter().map(|e| (e.name.clone(), e)).collect();

        let mut versions = Vec::with_capacity(steps.len() + 1);
        for step in steps.iter().rev() {
            versions.push(SchemaVersion {
                version: step.version,
                entities: shapes.clone(),
            });
            for change in step.changes.iter().rev() {
                change
                    .inverse()
                    .apply(&mut shapes)
                    .map_err(|reason| RegistryError::InvalidChange {
                        version: step.version,
                        change: change.to_string(),
                        reason,
                    })?;
            }
        }
        versions.push(SchemaVersion {
            version: baseline,
            entities: shapes,
        });
        versions.reverse();

        let checksums = versions.iter().map(|v| v.structural_checksum()).collect();
        let registry = Self {
            steps,
            versions,
            checksums,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Build a single-version registry.
    pub fn single(version: SchemaVersion) -> Result<Self, RegistryError> {
        Self::new(version.entities.into_values(), version.version, Vec::new())
    }

    /// Check every registry invariant.
    ///
    /// Versions strictly increase, each step's changes replay forward from
    /// the previous version onto the next, and no two versions share a
    /// structural checksum.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for pair in self.versions.windows(2) {
            if pair[1].version <= pair[0].version {
                return Err(RegistryError::NonIncreasingVersion {
                    previous: pair[0].version,
                    version: pair[1].version,
                });
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            let mut shapes = self.versions[i].entities.clone();
            for change in &step.changes {
                change
                    .apply(&mut shapes)
                    .map_err(|reason| RegistryError::InvalidChange {
                        version: step.version,
                        change: change.to_string(),
                        reason,
                    })?;
            }
            let produced = SchemaVersion {
                version: step.version,
                entities: shapes,
            };
            if !produced.same_structure(&self.versions[i + 1]) {
                return Err(RegistryError::InvalidChange {
                    version: step.version,
                    change: step.description.clone(),
                    reason: "replaying the step does not reproduce the recorded shape".to_string(),
                });
            }
        }

        let mut seen: BTreeMap<StructuralChecksum, VersionNumber> = BTreeMap::new();
        for (version, checksum) in self.versions.iter().zip(&self.checksums) {
            if let Some(first) = seen.insert(*checksum, version.version) {
                return Err(RegistryError::DuplicateChecksum {
                    first,
                    second: version.version,
                    checksum: checksum.short(),
                });
            }
        }
        Ok(())
    }

    /// All versions, oldest first. Never empty.
    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    /// The newest version.
    pub fn current(&self) -> &SchemaVersion {
        // Construction always pushes the baseline.
        &self.versions[self.versions.len() - 1]
    }

    /// The oldest version.
    pub fn baseline(&self) -> &SchemaVersion {
        &self.versions[0]
    }

    /// Look up a version.
    pub fn get(&self, version: VersionNumber) -> Option<&SchemaVersion> {
        self.index_of(version).map(|i| &self.versions[i])
    }

    /// Position of a version in registry order.
    pub fn index_of(&self, version: VersionNumber) -> Option<usize> {
        self.versions
            .binary_search_by(|v| v.version.cmp(&version))
            .ok()
    }

    /// Structural checksum of a version.
    pub fn checksum(&self, version: VersionNumber) -> Option<StructuralChecksum> {
        self.index_of(version).map(|i| self.checksums[i])
    }

    /// Find the version with a given structural checksum.
    pub fn version_for_checksum(&self, checksum: &StructuralChecksum) -> Option<VersionNumber> {
        self.checksums
            .iter()
            .position(|c| c == checksum)
            .map(|i| self.versions[i].version)
    }

    /// Steps in registry order; step `i` leads to version `i + 1`.
    pub fn steps(&self) -> &[VersionStep] {
        &self.steps
    }

    /// The step producing a version, if it is not the baseline.
    pub fn step_to(&self, version: VersionNumber) -> Option<&VersionStep> {
        self.steps.iter().find(|s| s.version == version)
    }
}
