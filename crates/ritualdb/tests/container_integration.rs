//! Integration tests for store startup.

use ritualdb::{
    ContainerError, ContainerState, PersistentStoreContainer, RestoreOutcome, StoreConfig,
};
use ritualdb_backup::RestoreError;
use ritualdb_core::app::{self, HABIT, PERSONALITY_ANALYSIS, PERSONALITY_PREFERENCES};
use ritualdb_core::catalog::{EntityShape, FieldDef, FieldType, ScalarType, VersionNumber};
use ritualdb_core::migration::{FnHook, HookError, MigrationError, MigrationStage, StageContext};
use ritualdb_core::port::{FileSystem, MemoryKeyValueStore, OsFileSystem};
use ritualdb_core::registry::{SchemaChange, SchemaRegistry, VersionStep};
use ritualdb_core::store::{Hosting, RecordStore, Row, StoreLocation, Value};
use ritualdb_core::{MigrationStatus, StageCatalog, StoreRole, TierPolicy};
use std::sync::Arc;

struct TestContext {
    fs: Arc<dyn FileSystem>,
    kv: Arc<MemoryKeyValueStore>,
    config: StoreConfig,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            fs: Arc::new(OsFileSystem::new()),
            kv: Arc::new(MemoryKeyValueStore::new()),
            config: StoreConfig::new(dir.path()),
            _dir: dir,
        }
    }

    /// A fresh container over the same files and settings, like a restart.
    fn container(&self) -> PersistentStoreContainer {
        let registry = Arc::new(app::build_registry().unwrap());
        let catalog = Arc::new(app::build_stage_catalog(&registry).unwrap());
        PersistentStoreContainer::new(
            self.config.clone(),
            self.fs.clone(),
            self.kv.clone(),
            registry,
            catalog,
            app::tier_policy(),
        )
        .unwrap()
    }

    fn location(&self, name: &str) -> StoreLocation {
        StoreLocation::new(&self.config.data_dir, name)
    }
}

fn habit(name: &str) -> Row {
    Row::new()
        .set("name", name)
        .set("createdAt", Value::Timestamp(1_700_000_000_000_000))
}

#[test]
fn test_for_application_fresh_install() {
    let dir = tempfile::tempdir().unwrap();
    let container = PersistentStoreContainer::for_application(StoreConfig::new(dir.path())).unwrap();
    let stores = container.open().unwrap();

    assert_eq!(stores.shared.version(), app::V8);
    assert!(dir.path().join("Ritualist.store").exists());
    assert!(dir.path().join("Private.store").exists());
    assert!(dir.path().join("settings").exists());
    assert_eq!(container.last_known_version("Ritualist").unwrap(), Some(app::V8));
}

#[test]
fn test_upgrade_from_first_release() {
    let ctx = TestContext::new();
    {
        let registry = app::build_registry().unwrap();
        let mut store = RecordStore::create(
            ctx.fs.clone(),
            ctx.location("Ritualist"),
            registry.baseline(),
            Hosting::All,
        )
        .unwrap();
        store
            .insert(
                HABIT,
                habit("Meditate")
                    .set("scheduleKind", "daysOfWeek")
                    .set("scheduleDays", vec![2i64, 4]),
            )
            .unwrap();
    }

    let container = ctx.container();
    let mut stores = container.open().unwrap();

    assert_eq!(stores.migrations.len(), 1);
    assert_eq!(stores.migrations[0].stages.len(), 7);
    assert_eq!(stores.migrations[0].snapshots().len(), 2);

    let habits = stores.shared.rows(HABIT).unwrap();
    assert_eq!(habits.len(), 1);
    assert_eq!(habits[0].get("schedule"), Some(&Value::from("days:2,4")));
    assert_eq!(
        habits[0].get("startDate"),
        Some(&Value::Timestamp(1_700_000_000_000_000))
    );
    assert!(!stores.shared.has_table(PERSONALITY_ANALYSIS));
    assert!(!stores.shared.has_table(PERSONALITY_PREFERENCES));

    let private = stores.store_for_mut(PERSONALITY_PREFERENCES);
    private.insert(PERSONALITY_PREFERENCES, Row::new()).unwrap();
    assert_eq!(private.location().name(), "Private");

    let history = container.logger().history().unwrap();
    assert_eq!(history.len(), 7);
    assert!(history.iter().all(|e| e.status == MigrationStatus::Succeeded));
    assert_eq!(container.backups(StoreRole::Shared).list_backups().unwrap().len(), 2);
}

#[test]
fn test_sync_toggle_keeps_store_identity() {
    let ctx = TestContext::new();
    for sync in [false, true, false] {
        let mut ctx_config = ctx.config.clone();
        ctx_config.sync_available = sync;
        let registry = Arc::new(app::build_registry().unwrap());
        let catalog = Arc::new(app::build_stage_catalog(&registry).unwrap());
        let container = PersistentStoreContainer::new(
            ctx_config,
            ctx.fs.clone(),
            ctx.kv.clone(),
            registry,
            catalog,
            app::tier_policy(),
        )
        .unwrap();

        let mut stores = container.open().unwrap();
        assert_eq!(stores.layout.shared.name, "Ritualist");
        assert_eq!(stores.layout.shared.sync_enabled, sync);
        assert!(!stores.layout.private.sync_enabled);
        assert!(!stores.shared.has_table(PERSONALITY_ANALYSIS));

        stores.shared.insert(HABIT, habit("Read")).unwrap();
        let synced = container
            .tiers()
            .synced_entities(container.registry().current(), sync);
        assert!(!synced.iter().any(|e| e == PERSONALITY_ANALYSIS));
    }

    let store = RecordStore::open(ctx.fs.clone(), ctx.location("Ritualist")).unwrap();
    assert_eq!(store.count(HABIT).unwrap(), 3, "no rows orphaned by sync toggles");
}

#[test]
fn test_pending_restore_runs_before_open() {
    let ctx = TestContext::new();
    {
        let container = ctx.container();
        let mut stores = container.open().unwrap();
        stores.shared.insert(HABIT, habit("Meditate")).unwrap();
        stores.shared.checkpoint().unwrap();

        let backups = container.backups(StoreRole::Shared);
        let record = backups.create_backup().unwrap();
        stores.shared.insert(HABIT, habit("Read")).unwrap();
        backups.schedule_pending_restore(&record).unwrap();
    }

    let container = ctx.container();
    let stores = container.open().unwrap();

    assert_eq!(stores.shared.count(HABIT).unwrap(), 1);
    assert_eq!(
        container.transitions(),
        vec![
            ContainerState::Unopened,
            ContainerState::RestoringPending,
            ContainerState::Unopened,
            ContainerState::Open
        ]
    );
    assert!(container
        .backups(StoreRole::Shared)
        .pending_restore()
        .unwrap()
        .is_none());
}

#[test]
fn test_pending_restore_of_missing_backup_fails_once() {
    let ctx = TestContext::new();
    {
        let container = ctx.container();
        drop(container.open().unwrap());
        let backups = container.backups(StoreRole::Shared);
        let record = backups.create_backup().unwrap();
        backups.schedule_pending_restore(&record).unwrap();
        ctx.fs.remove_file(&record.store_path).unwrap();
    }

    let container = ctx.container();
    let err = container.open().unwrap_err();
    assert!(matches!(
        err,
        ContainerError::RestoreFailed(RestoreError::BackupMissing(_))
    ));
    assert_eq!(container.state(), ContainerState::Failed);

    let container = ctx.container();
    container.open().unwrap();
    assert_eq!(
        container.transitions(),
        vec![ContainerState::Unopened, ContainerState::Open]
    );
}

fn refuse(_ctx: &mut StageContext<'_>) -> Result<(), HookError> {
    Err("start dates unavailable".into())
}

fn failing_container(ctx: &TestContext, auto_restore: bool) -> PersistentStoreContainer {
    let v = |major| VersionNumber::new(major, 0, 0);
    let current = EntityShape::new("Habit")
        .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid)))
        .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
        .with_field(FieldDef::optional(
            "archivedAt",
            FieldType::scalar(ScalarType::Timestamp),
        ))
        .with_field(FieldDef::new(
            "startDate",
            FieldType::scalar(ScalarType::Timestamp),
        ));
    let registry = Arc::new(
        SchemaRegistry::new(
            [current],
            v(1),
            vec![
                VersionStep::new(v(2), "Archive").with_change(SchemaChange::add_field(
                    "Habit",
                    FieldDef::optional("archivedAt", FieldType::scalar(ScalarType::Timestamp)),
                )),
                VersionStep::new(v(3), "Start dates").with_change(SchemaChange::add_field(
                    "Habit",
                    FieldDef::new("startDate", FieldType::scalar(ScalarType::Timestamp)),
                )),
            ],
        )
        .unwrap(),
    );
    let catalog = Arc::new(
        StageCatalog::new(
            &registry,
            vec![
                MigrationStage::lightweight(v(1), v(2)),
                MigrationStage::custom(v(2), v(3)).with_post_hook(FnHook::arc("refuse", refuse)),
            ],
        )
        .unwrap(),
    );
    PersistentStoreContainer::new(
        ctx.config.clone().with_auto_restore(auto_restore),
        ctx.fs.clone(),
        ctx.kv.clone(),
        registry.clone(),
        catalog,
        TierPolicy::new(),
    )
    .unwrap()
}

fn seed_first_version(ctx: &TestContext, container: &PersistentStoreContainer) {
    let mut store = RecordStore::create(
        ctx.fs.clone(),
        ctx.location("Ritualist"),
        container.registry().baseline(),
        Hosting::All,
    )
    .unwrap();
    store.insert("Habit", Row::new().set("name", "Read")).unwrap();
}

#[test]
fn test_failed_migration_restores_snapshot_of_the_run() {
    let ctx = TestContext::new();
    let container = failing_container(&ctx, true);
    seed_first_version(&ctx, &container);

    let err = container.open().unwrap_err();
    match &err {
        ContainerError::MigrationFailed { source, restore } => {
            let MigrationError::MigrationFailed {
                completed: 1,
                snapshots,
                ..
            } = source
            else {
                panic!("Expected one completed stage, got {source:?}");
            };
            assert_eq!(snapshots.len(), 1);
            assert_eq!(restore, &RestoreOutcome::Restored(snapshots[0].clone()));
        }
        other => panic!("Expected MigrationFailed, got {other:?}"),
    }
    assert_eq!(
        container.transitions(),
        vec![
            ContainerState::Unopened,
            ContainerState::Migrating,
            ContainerState::Failed
        ]
    );

    let store = RecordStore::open(ctx.fs.clone(), ctx.location("Ritualist")).unwrap();
    assert_eq!(store.version(), VersionNumber::new(2, 0, 0));
    assert_eq!(store.count("Habit").unwrap(), 1);

    let failed = container
        .logger()
        .events_for(VersionNumber::new(2, 0, 0), VersionNumber::new(3, 0, 0))
        .unwrap();
    assert_eq!(failed[0].status, MigrationStatus::Failed);
}

#[test]
fn test_failed_migration_keeps_rows_newer_than_old_backup() {
    let mut ctx = TestContext::new();
    ctx.config = ctx.config.clone().with_snapshots(false);
    let container = failing_container(&ctx, true);
    seed_first_version(&ctx, &container);

    let manual = container.backups(StoreRole::Shared).create_backup().unwrap();
    {
        let mut store = RecordStore::open(ctx.fs.clone(), ctx.location("Ritualist")).unwrap();
        store.insert("Habit", Row::new().set("name", "Stretch")).unwrap();
        store.checkpoint().unwrap();
    }

    match container.open().unwrap_err() {
        ContainerError::MigrationFailed { source, restore } => {
            assert!(matches!(
                source,
                MigrationError::MigrationFailed { ref snapshots, .. } if snapshots.is_empty()
            ));
            assert_eq!(restore, RestoreOutcome::NotAttempted);
        }
        other => panic!("Expected MigrationFailed, got {other:?}"),
    }

    let store = RecordStore::open(ctx.fs.clone(), ctx.location("Ritualist")).unwrap();
    assert_eq!(store.version(), VersionNumber::new(2, 0, 0));
    assert_eq!(store.count("Habit").unwrap(), 2);
    let backups = container.backups(StoreRole::Shared).list_backups().unwrap();
    assert_eq!(backups, vec![manual]);
}

#[test]
fn test_failed_migration_without_auto_restore() {
    let ctx = TestContext::new();
    let container = failing_container(&ctx, false);
    seed_first_version(&ctx, &container);

    match container.open().unwrap_err() {
        ContainerError::MigrationFailed { restore, .. } => {
            assert_eq!(restore, RestoreOutcome::NotAttempted);
        }
        other => panic!("Expected MigrationFailed, got {other:?}"),
    }
    assert!(container.open().is_err(), "a failed container stays failed");
}
