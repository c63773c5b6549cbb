//! Migration stages of the habit tracker.

use super::schedule::Schedule;
use super::schema::{HABIT, V1, V2, V3, V4, V5, V6, V7, V8};
use crate::migration::{FnHook, HookError, MigrationStage, StageContext};
use crate::store::{current_timestamp, Value};

/// Every stage, 1.0.0 to the newest version.
pub fn stages() -> Vec<MigrationStage> {
    vec![
        MigrationStage::lightweight(V1, V2),
        MigrationStage::lightweight(V2, V3),
        MigrationStage::lightweight(V3, V4),
        MigrationStage::custom(V4, V5)
            .with_post_hook(FnHook::arc("backfill-start-date", backfill_start_date)),
        MigrationStage::custom(V5, V6)
            .with_post_hook(FnHook::arc("collapse-legacy-schedule", collapse_legacy_schedule)),
        MigrationStage::lightweight(V6, V7),
        MigrationStage::lightweight(V7, V8),
    ]
}

/// A habit starts on the day it was created.
fn backfill_start_date(ctx: &mut StageContext<'_>) -> Result<(), HookError> {
    let now = current_timestamp() as i64;
    let visited = ctx.update_rows(HABIT, |row, _| {
        if row.get("startDate").map_or(true, Value::is_null) {
            let created = row
                .get("createdAt")
                .and_then(Value::as_timestamp)
                .unwrap_or(now);
            row.put("startDate", Value::Timestamp(created));
        }
    })?;
    tracing::debug!(habits = visited, "Backfilled start dates");
    Ok(())
}

/// The pre-6.0.0 schedule kind and day list become one encoded schedule.
fn collapse_legacy_schedule(ctx: &mut StageContext<'_>) -> Result<(), HookError> {
    let visited = ctx.update_rows(HABIT, |row, legacy| {
        let kind = legacy.get("scheduleKind").and_then(Value::as_str);
        let days = legacy
            .get("scheduleDays")
            .and_then(Value::as_int_array)
            .unwrap_or(&[]);
        row.put("schedule", Schedule::from_legacy(kind, days).to_string());
    })?;
    tracing::debug!(habits = visited, "Collapsed legacy schedules");
    Ok(())
}
