//! Integration tests for backups on the OS file system.

use ritualdb_backup::{BackupConfig, BackupError, BackupManager, RestoreError};
use ritualdb_core::app::{self, HABIT};
use ritualdb_core::migration::MigrationEngine;
use ritualdb_core::port::{FileSystem, OsFileSystem, SledKeyValueStore};
use ritualdb_core::store::{Hosting, RecordStore, Row, StoreLocation, Value};
use std::sync::Arc;

struct TestContext {
    fs: Arc<dyn FileSystem>,
    location: StoreLocation,
    manager: Arc<BackupManager>,
    _dir: tempfile::TempDir,
    _settings: sled::Db,
}

impl TestContext {
    fn new(retention: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = sled::Config::new().temporary(true).open().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem::new());
        let location = StoreLocation::new(dir.path(), "Ritualist");
        let manager = Arc::new(BackupManager::new(
            fs.clone(),
            Arc::new(SledKeyValueStore::open(&settings).unwrap()),
            location.clone(),
            BackupConfig::with_retention(retention),
        ));
        Self {
            fs,
            location,
            manager,
            _dir: dir,
            _settings: settings,
        }
    }

    fn open(&self) -> RecordStore {
        RecordStore::open(self.fs.clone(), self.location.clone()).unwrap()
    }
}

fn habit(name: &str) -> Row {
    Row::new()
        .set("name", name)
        .set("createdAt", Value::Timestamp(1_700_000_000_000_000))
}

#[test]
fn test_backup_mutate_restore_is_bit_identical() {
    let ctx = TestContext::new(3);
    let registry = app::build_registry().unwrap();
    let meditate = {
        let mut store =
            RecordStore::create(ctx.fs.clone(), ctx.location.clone(), registry.baseline(), Hosting::All)
                .unwrap();
        let id = store.insert(HABIT, habit("Meditate")).unwrap();
        store.insert(HABIT, habit("Read")).unwrap();
        id
    };

    let before: Vec<_> = std::iter::once(ctx.location.primary_path())
        .chain(ctx.location.companion_paths())
        .map(|p| ctx.fs.exists(&p).then(|| ctx.fs.read(&p).unwrap()))
        .collect();
    let record = ctx.manager.create_backup().unwrap();

    {
        let mut store = ctx.open();
        store.delete(HABIT, &meditate).unwrap();
        store.insert(HABIT, habit("Stretch")).unwrap();
        store.checkpoint().unwrap();
    }

    ctx.manager.restore(&record).unwrap();

    let after: Vec<_> = std::iter::once(ctx.location.primary_path())
        .chain(ctx.location.companion_paths())
        .map(|p| ctx.fs.exists(&p).then(|| ctx.fs.read(&p).unwrap()))
        .collect();
    assert_eq!(before, after);

    let store = ctx.open();
    assert_eq!(store.count(HABIT).unwrap(), 2);
    assert!(store.get(HABIT, &meditate).unwrap().is_some());
}

#[test]
fn test_pending_restore_survives_manager_restart() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("settings");
    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem::new());
    let location = StoreLocation::new(dir.path(), "Ritualist");
    let registry = app::build_registry().unwrap();

    let manager = |kv: SledKeyValueStore| {
        BackupManager::new(fs.clone(), Arc::new(kv), location.clone(), BackupConfig::default())
    };

    {
        let mut store =
            RecordStore::create(fs.clone(), location.clone(), registry.baseline(), Hosting::All)
                .unwrap();
        store.insert(HABIT, habit("Meditate")).unwrap();
        let backups = manager(SledKeyValueStore::open_path(&settings_path).unwrap());
        let record = backups.create_backup().unwrap();
        store.insert(HABIT, habit("Read")).unwrap();
        backups.schedule_pending_restore(&record).unwrap();
    }

    let backups = manager(SledKeyValueStore::open_path(&settings_path).unwrap());
    assert!(backups.pending_restore().unwrap().is_some());
    backups.execute_pending_restore_if_needed().unwrap().unwrap();
    assert!(backups.pending_restore().unwrap().is_none());

    let store = RecordStore::open(fs.clone(), location.clone()).unwrap();
    assert_eq!(store.count(HABIT).unwrap(), 1);
}

#[test]
fn test_snapshots_before_custom_stages() {
    let ctx = TestContext::new(5);
    let registry = Arc::new(app::build_registry().unwrap());
    let catalog = Arc::new(app::build_stage_catalog(&registry).unwrap());
    let engine = MigrationEngine::new(registry.clone(), catalog).with_safety_net(ctx.manager.clone());

    let mut store =
        RecordStore::create(ctx.fs.clone(), ctx.location.clone(), registry.baseline(), Hosting::All)
            .unwrap();
    store.insert(HABIT, habit("Meditate")).unwrap();
    let outcome = engine.migrate(&mut store, app::V1, app::V8).unwrap();
    drop(store);

    let snapshots: Vec<_> = outcome.snapshots().into_iter().map(|p| p.to_path_buf()).collect();
    assert_eq!(snapshots.len(), 2);

    let backups = ctx.manager.list_backups().unwrap();
    assert_eq!(backups.len(), 2);
    assert_eq!(backups[1].store_path, snapshots[0]);
    assert_eq!(backups[0].store_path, snapshots[1]);

    // The oldest snapshot holds the store as it was entering 5.0.0.
    ctx.manager.restore(&backups[1]).unwrap();
    assert_eq!(ctx.open().version(), app::V4);
}

#[test]
fn test_restore_of_deleted_backup() {
    let ctx = TestContext::new(3);
    let registry = app::build_registry().unwrap();
    drop(
        RecordStore::create(ctx.fs.clone(), ctx.location.clone(), registry.baseline(), Hosting::All)
            .unwrap(),
    );
    let record = ctx.manager.create_backup().unwrap();
    assert_eq!(ctx.manager.delete_all_backups().unwrap(), 1);

    assert!(matches!(
        ctx.manager.restore(&record),
        Err(RestoreError::BackupMissing(_))
    ));
    assert!(matches!(
        ctx.manager.restore_latest_backup(),
        Err(RestoreError::NoBackupAvailable)
    ));
}

#[test]
fn test_private_backup_never_lands_in_shared_store() {
    let ctx = TestContext::new(3);
    let registry = app::build_registry().unwrap();
    {
        let mut store =
            RecordStore::create(ctx.fs.clone(), ctx.location.clone(), registry.baseline(), Hosting::All)
                .unwrap();
        store.insert(HABIT, habit("Meditate")).unwrap();
        store.checkpoint().unwrap();
    }

    let private = StoreLocation::new(ctx.location.directory(), app::PRIVATE_STORE_NAME);
    drop(RecordStore::create(ctx.fs.clone(), private.clone(), registry.baseline(), Hosting::All).unwrap());
    let private_backups = BackupManager::new(
        ctx.fs.clone(),
        Arc::new(SledKeyValueStore::open(&ctx._settings).unwrap()),
        private,
        BackupConfig::default(),
    );
    let foreign = private_backups.create_backup().unwrap();

    assert!(matches!(
        ctx.manager.record_at(&foreign.store_path),
        Err(RestoreError::WrongStore { .. })
    ));
    assert!(matches!(
        ctx.manager.restore(&foreign),
        Err(RestoreError::WrongStore { .. })
    ));
    assert!(matches!(
        ctx.manager.schedule_pending_restore(&foreign),
        Err(BackupError::WrongStore { .. })
    ));
    assert!(ctx.manager.pending_restore().unwrap().is_none());

    let store = ctx.open();
    assert_eq!(store.count(HABIT).unwrap(), 1);
}
