//! The habit tracker's compiled-in schema history.
//!
//! Eight versions, 1.0.0 to 8.0.0. Stages into 5.0.0 and 6.0.0 are custom:
//! the first backfills `Habit.startDate` from `createdAt`, the second
//! collapses the legacy `scheduleKind`/`scheduleDays` pair into one encoded
//! `schedule`. Personality data is local-only from 7.0.0 on.

mod schedule;
mod schema;
mod stages;

pub use schedule::{ParseScheduleError, Schedule};
pub use schema::{
    current_shapes, steps, HABIT, HABIT_CATEGORY, HABIT_LOG, ONBOARDING_STATE,
    PERSONALITY_ANALYSIS, PERSONALITY_PREFERENCES, USER_PROFILE, V1, V2, V3, V4, V5, V6, V7, V8,
};
pub use stages::stages;

use crate::migration::{MigrationError, StageCatalog};
use crate::registry::{RegistryError, SchemaRegistry};
use crate::tier::{TierConfigurator, TierPolicy};

/// Name of the sync-capable store.
pub const SHARED_STORE_NAME: &str = "Ritualist";

/// Name of the never-synced store.
pub const PRIVATE_STORE_NAME: &str = "Private";

/// Build the registry.
pub fn build_registry() -> Result<SchemaRegistry, RegistryError> {
    SchemaRegistry::new(current_shapes(), V1, steps())
}

/// Build the stage catalog over a registry built by [`build_registry`].
pub fn build_stage_catalog(registry: &SchemaRegistry) -> Result<StageCatalog, MigrationError> {
    let catalog = StageCatalog::new(registry, stages())?;
    catalog.validate_complete(registry)?;
    Ok(catalog)
}

/// Local-only pins.
pub fn tier_policy() -> TierPolicy {
    TierPolicy::new()
        .with_pin(PERSONALITY_ANALYSIS, V7)
        .with_pin(PERSONALITY_PREFERENCES, V8)
}

/// Tier configurator with the default store names.
pub fn tier_configurator() -> TierConfigurator {
    TierConfigurator::new(tier_policy(), SHARED_STORE_NAME, PRIVATE_STORE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_validates() {
        let registry = build_registry().unwrap();
        registry.validate().unwrap();

        let versions: Vec<_> = registry.versions().iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![V1, V2, V3, V4, V5, V6, V7, V8]);
        assert_eq!(registry.current().version, V8);
    }

    #[test]
    fn test_stage_catalog_covers_registry() {
        let registry = build_registry().unwrap();
        let catalog = build_stage_catalog(&registry).unwrap();

        assert_eq!(catalog.stages().len(), registry.versions().len() - 1);
        for (stage, pair) in catalog.stages().iter().zip(registry.versions().windows(2)) {
            assert_eq!(stage.from, pair[0].version);
            assert_eq!(stage.to, pair[1].version);
        }
        let custom: Vec<_> = catalog
            .stages()
            .iter()
            .filter(|s| s.is_custom())
            .map(|s| s.to)
            .collect();
        assert_eq!(custom, vec![V5, V6]);
    }

    #[test]
    fn test_tier_policy_validates() {
        let registry = build_registry().unwrap();
        tier_policy().validate(&registry).unwrap();
    }

    #[test]
    fn test_historical_shapes() {
        let registry = build_registry().unwrap();

        let v1_habit = registry.get(V1).unwrap().get_entity(HABIT).unwrap();
        assert!(v1_habit.get_field("scheduleKind").is_some());
        assert!(v1_habit.get_field("archivedAt").is_none());
        assert!(v1_habit.get_field("schedule").is_none());

        let v5 = registry.get(V5).unwrap();
        assert!(v5.get_entity(HABIT).unwrap().get_field("startDate").is_some());
        assert!(v5.get_entity(PERSONALITY_PREFERENCES).is_none());
        assert!(registry.get(V3).unwrap().get_entity(PERSONALITY_ANALYSIS).is_none());
    }
}
