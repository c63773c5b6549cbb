//! Storage tier assignment.
//!
//! Entities live in one of two physical stores. The shared store may be
//! synchronized to a remote replica; the private store never is. Entities
//! pinned local-only always live in the private store, whatever the sync
//! availability. The shared store keeps the same name whether or not sync
//! is available, so rows written offline are still there once sync returns.

use crate::catalog::{SchemaVersion, VersionNumber};
use crate::registry::{RegistryError, SchemaRegistry};
use crate::store::Hosting;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Storage tier of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Tier {
    /// Stored in the shared store with sync enabled.
    Synced,
    /// Never leaves the device.
    LocalOnly,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Synced => write!(f, "synced"),
            Tier::LocalOnly => write!(f, "local-only"),
        }
    }
}

/// The two physical stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StoreRole {
    /// Sync-capable store.
    Shared,
    /// Never-synced store.
    Private,
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreRole::Shared => write!(f, "shared"),
            StoreRole::Private => write!(f, "private"),
        }
    }
}

/// An entity pinned to the private store from a version on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalOnlyPin {
    /// Entity name.
    pub entity: String,
    /// First version the pin applies to.
    pub since: VersionNumber,
}

/// The set of local-only pins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierPolicy {
    pins: Vec<LocalOnlyPin>,
}

impl TierPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin an entity local-only from `since` on.
    pub fn with_pin(mut self, entity: impl Into<String>, since: VersionNumber) -> Self {
        self.pins.push(LocalOnlyPin {
            entity: entity.into(),
            since,
        });
        self
    }

    /// All pins.
    pub fn pins(&self) -> &[LocalOnlyPin] {
        &self.pins
    }

    /// Entities pinned at a version.
    pub fn pinned_at(&self, version: VersionNumber) -> BTreeSet<String> {
        self.pins
            .iter()
            .filter(|p| p.since <= version)
            .map(|p| p.entity.clone())
            .collect()
    }

    /// Check whether an entity is pinned at a version.
    pub fn is_pinned(&self, entity: &str, version: VersionNumber) -> bool {
        self.pins
            .iter()
            .any(|p| p.entity == entity && p.since <= version)
    }

    /// Check the pins against a registry.
    ///
    /// Every pin must start at a registry version and its entity must exist
    /// in that version and every later one, so the pinned set only grows.
    pub fn validate(&self, registry: &SchemaRegistry) -> Result<(), RegistryError> {
        for pin in &self.pins {
            let regression = |version| RegistryError::PrivacyRegression {
                entity: pin.entity.clone(),
                version,
            };

            if registry.get(pin.since).is_none() {
                return Err(regression(pin.since));
            }
            if let Some(missing) = registry
                .versions()
                .iter()
                .filter(|v| v.version >= pin.since)
                .find(|v| v.get_entity(&pin.entity).is_none())
            {
                return Err(regression(missing.version));
            }
        }
        Ok(())
    }
}

/// How one physical store is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePlan {
    /// Which store.
    pub role: StoreRole,
    /// Store name; fixed regardless of sync availability.
    pub name: String,
    /// Entities the store keeps tables for.
    pub hosting: Hosting,
    /// Whether the external sync backend is enabled for the store.
    pub sync_enabled: bool,
}

/// Both stores for a schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    /// Sync-capable store.
    pub shared: StorePlan,
    /// Never-synced store.
    pub private: StorePlan,
}

/// Assigns entities to tiers and stores.
#[derive(Debug, Clone)]
pub struct TierConfigurator {
    policy: TierPolicy,
    shared_store: String,
    private_store: String,
}

impl TierConfigurator {
    /// Create a configurator.
    pub fn new(
        policy: TierPolicy,
        shared_store: impl Into<String>,
        private_store: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            shared_store: shared_store.into(),
            private_store: private_store.into(),
        }
    }

    /// The pin policy.
    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// Tier of every entity in a schema.
    pub fn tier_assignments(
        &self,
        schema: &SchemaVersion,
        sync_available: bool,
    ) -> BTreeMap<String, Tier> {
        schema
            .entity_names()
            .into_iter()
            .map(|name| {
                let tier = if sync_available && !self.policy.is_pinned(name, schema.version) {
                    Tier::Synced
                } else {
                    Tier::LocalOnly
                };
                (name.to_string(), tier)
            })
            .collect()
    }

    /// Store an entity lives in at a version.
    pub fn store_for(&self, entity: &str, version: VersionNumber) -> StoreRole {
        if self.policy.is_pinned(entity, version) {
            StoreRole::Private
        } else {
            StoreRole::Shared
        }
    }

    /// How both stores are opened at a version.
    pub fn store_layout(&self, version: VersionNumber, sync_available: bool) -> StoreLayout {
        let pinned = self.policy.pinned_at(version);
        StoreLayout {
            shared: StorePlan {
                role: StoreRole::Shared,
                name: self.shared_store.clone(),
                hosting: Hosting::Except(pinned.clone()),
                sync_enabled: sync_available,
            },
            private: StorePlan {
                role: StoreRole::Private,
                name: self.private_store.clone(),
                hosting: Hosting::Only(pinned),
                sync_enabled: false,
            },
        }
    }

    /// Entities whose rows may leave the device at a version.
    pub fn synced_entities(&self, schema: &SchemaVersion, sync_available: bool) -> Vec<String> {
        self.tier_assignments(schema, sync_available)
            .into_iter()
            .filter(|(_, tier)| *tier == Tier::Synced)
            .map(|(name, _)| name)
            .collect()
    }
}
