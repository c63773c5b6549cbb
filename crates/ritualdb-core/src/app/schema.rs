//! Entity shapes and version history of the habit tracker.

use crate::catalog::{
    DefaultValue, DeleteRule, EntityShape, FieldDef, FieldType, RelationDef, ScalarType,
    VersionNumber,
};
use crate::registry::{SchemaChange, VersionStep};

pub const V1: VersionNumber = VersionNumber::new(1, 0, 0);
pub const V2: VersionNumber = VersionNumber::new(2, 0, 0);
pub const V3: VersionNumber = VersionNumber::new(3, 0, 0);
pub const V4: VersionNumber = VersionNumber::new(4, 0, 0);
pub const V5: VersionNumber = VersionNumber::new(5, 0, 0);
pub const V6: VersionNumber = VersionNumber::new(6, 0, 0);
pub const V7: VersionNumber = VersionNumber::new(7, 0, 0);
pub const V8: VersionNumber = VersionNumber::new(8, 0, 0);

pub const HABIT: &str = "Habit";
pub const HABIT_LOG: &str = "HabitLog";
pub const HABIT_CATEGORY: &str = "HabitCategory";
pub const USER_PROFILE: &str = "UserProfile";
pub const ONBOARDING_STATE: &str = "OnboardingState";
pub const PERSONALITY_ANALYSIS: &str = "PersonalityAnalysis";
pub const PERSONALITY_PREFERENCES: &str = "PersonalityPreferences";

fn id() -> FieldDef {
    FieldDef::new("id", FieldType::scalar(ScalarType::Uuid))
}

fn required(name: &str, scalar: ScalarType) -> FieldDef {
    FieldDef::new(name, FieldType::scalar(scalar))
}

fn optional(name: &str, scalar: ScalarType) -> FieldDef {
    FieldDef::optional(name, FieldType::scalar(scalar))
}

// Fields that changed across versions, shared by the current shapes and
// the steps.

fn archived_at() -> FieldDef {
    optional("archivedAt", ScalarType::Timestamp)
}

fn color_hex() -> FieldDef {
    required("colorHex", ScalarType::String).with_default(DefaultValue::String("#2DA9E3".into()))
}

fn appearance() -> FieldDef {
    FieldDef::new(
        "appearance",
        FieldType::enum_type("Appearance", &["followSystem", "light", "dark"]),
    )
    .with_default(DefaultValue::String("followSystem".into()))
}

fn category_id() -> FieldDef {
    optional("categoryId", ScalarType::Uuid)
}

fn display_order() -> FieldDef {
    required("displayOrder", ScalarType::Int).with_default(DefaultValue::Int(0))
}

fn daily_target_v1() -> FieldDef {
    required("dailyTarget", ScalarType::Int).with_default(DefaultValue::Int(1))
}

fn daily_target() -> FieldDef {
    required("dailyTarget", ScalarType::Float).with_default(DefaultValue::Float(1.0))
}

fn log_notes() -> FieldDef {
    optional("notes", ScalarType::String)
}

fn start_date() -> FieldDef {
    required("startDate", ScalarType::Timestamp)
}

fn schedule() -> FieldDef {
    required("schedule", ScalarType::String)
}

fn schedule_kind() -> FieldDef {
    FieldDef::new(
        "scheduleKind",
        FieldType::enum_type("ScheduleKind", &["daily", "daysOfWeek", "timesPerWeek"]),
    )
    .with_default(DefaultValue::String("daily".into()))
}

fn schedule_days() -> FieldDef {
    FieldDef::new("scheduleDays", FieldType::array(ScalarType::Int))
        .with_default(DefaultValue::EmptyArray)
}

fn home_timezone() -> FieldDef {
    optional("homeTimezone", ScalarType::String)
}

fn habit_category() -> EntityShape {
    EntityShape::new(HABIT_CATEGORY)
        .with_field(id())
        .with_field(required("name", ScalarType::String))
        .with_field(optional("emoji", ScalarType::String))
        .with_field(required("order", ScalarType::Int).with_default(DefaultValue::Int(0)))
        .with_relation(RelationDef::to_many("habits", HABIT, "categoryId"))
}

fn onboarding_state() -> EntityShape {
    EntityShape::new(ONBOARDING_STATE)
        .with_field(id())
        .with_field(required("currentPage", ScalarType::Int).with_default(DefaultValue::Int(0)))
        .with_field(
            required("isCompleted", ScalarType::Bool).with_default(DefaultValue::Bool(false)),
        )
        .with_field(optional("completedAt", ScalarType::Timestamp))
}

fn personality_analysis() -> EntityShape {
    EntityShape::new(PERSONALITY_ANALYSIS)
        .with_field(id())
        .with_field(required("analyzedAt", ScalarType::Timestamp))
        .with_field(required("dominantTrait", ScalarType::String))
        .with_field(required("confidence", ScalarType::Float))
        .with_field(optional("traitScores", ScalarType::String))
        .with_field(
            required("dataPoints", ScalarType::Int).with_default(DefaultValue::Int(0)),
        )
}

fn personality_preferences() -> EntityShape {
    EntityShape::new(PERSONALITY_PREFERENCES)
        .with_field(id())
        .with_field(required("isEnabled", ScalarType::Bool).with_default(DefaultValue::Bool(true)))
        .with_field(
            FieldDef::new(
                "analysisFrequency",
                FieldType::enum_type("AnalysisFrequency", &["daily", "weekly", "monthly"]),
            )
            .with_default(DefaultValue::String("weekly".into())),
        )
        .with_field(optional("lastAnalysisDate", ScalarType::Timestamp))
}

/// Entity shapes of the newest version.
pub fn current_shapes() -> Vec<EntityShape> {
    vec![
        EntityShape::new(HABIT)
            .with_field(id())
            .with_field(required("name", ScalarType::String))
            .with_field(optional("emoji", ScalarType::String))
            .with_field(
                FieldDef::new("kind", FieldType::enum_type("HabitKind", &["binary", "numeric"]))
                    .with_default(DefaultValue::String("binary".into())),
            )
            .with_field(daily_target())
            .with_field(optional("unitLabel", ScalarType::String))
            .with_field(
                required("isActive", ScalarType::Bool).with_default(DefaultValue::Bool(true)),
            )
            .with_field(required("createdAt", ScalarType::Timestamp))
            .with_field(archived_at())
            .with_field(color_hex())
            .with_field(category_id())
            .with_field(display_order())
            .with_field(start_date())
            .with_field(schedule())
            .with_relation(
                RelationDef::to_many("logs", HABIT_LOG, "habitId")
                    .with_on_delete(DeleteRule::Cascade),
            ),
        EntityShape::new(HABIT_LOG)
            .with_field(id())
            .with_field(required("habitId", ScalarType::Uuid))
            .with_field(required("date", ScalarType::Timestamp))
            .with_field(optional("value", ScalarType::Float))
            .with_field(log_notes()),
        habit_category(),
        EntityShape::new(USER_PROFILE)
            .with_field(id())
            .with_field(required("name", ScalarType::String))
            .with_field(optional("avatarImage", ScalarType::Bytes))
            .with_field(required("createdAt", ScalarType::Timestamp))
            .with_field(appearance())
            .with_field(home_timezone()),
        onboarding_state(),
        personality_analysis(),
        personality_preferences(),
    ]
}

/// Steps from 1.0.0 to the newest version.
pub fn steps() -> Vec<VersionStep> {
    vec![
        VersionStep::new(V2, "Habit archiving, colors and appearance").with_changes([
            SchemaChange::add_field(HABIT, archived_at()),
            SchemaChange::add_field(HABIT, color_hex()),
            SchemaChange::add_field(USER_PROFILE, appearance()),
        ]),
        VersionStep::new(V3, "Habit categories and fractional targets").with_changes([
            SchemaChange::AddEntity(habit_category()),
            SchemaChange::add_field(HABIT, category_id()),
            SchemaChange::add_field(HABIT, display_order()),
            SchemaChange::change_field(HABIT, daily_target_v1(), daily_target()),
        ]),
        VersionStep::new(V4, "Onboarding, log notes and personality insights").with_changes([
            SchemaChange::AddEntity(onboarding_state()),
            SchemaChange::AddEntity(personality_analysis()),
            SchemaChange::add_field(HABIT_LOG, log_notes()),
        ]),
        VersionStep::new(V5, "Habit start dates")
            .with_change(SchemaChange::add_field(HABIT, start_date())),
        VersionStep::new(V6, "Flexible schedules").with_changes([
            SchemaChange::add_field(HABIT, schedule()),
            SchemaChange::remove_field(HABIT, schedule_kind()),
            SchemaChange::remove_field(HABIT, schedule_days()),
        ]),
        VersionStep::new(V7, "Home timezone; personality data stays on device")
            .with_change(SchemaChange::add_field(USER_PROFILE, home_timezone())),
        VersionStep::new(V8, "Personality preferences")
            .with_change(SchemaChange::AddEntity(personality_preferences())),
    ]
}
