//! Startup orchestration for the shared and private stores.

use crate::config::StoreConfig;
use crate::error::{ContainerError, RestoreOutcome};
use crate::state::ContainerState;
use parking_lot::Mutex;
use ritualdb_backup::BackupManager;
use ritualdb_core::app;
use ritualdb_core::migration::{MigrationConfig, MigrationEngine, MigrationError, MigrationOutcome};
use ritualdb_core::port::{last_version_key, FileSystem, KeyValueStore, OsFileSystem, SledKeyValueStore};
use ritualdb_core::registry::SchemaRegistry;
use ritualdb_core::store::{RecordStore, StoreLocation};
use ritualdb_core::tier::{StoreLayout, StorePlan, StoreRole, TierConfigurator, TierPolicy};
use ritualdb_core::{MigrationLogger, StageCatalog, VersionNumber};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Proof that pending restores were resolved. Only
/// [`PersistentStoreContainer::resolve_pending_state`] creates one.
#[derive(Debug)]
#[must_use = "pass the token to open_store"]
pub struct PendingResolved {
    _resolved: (),
}

/// Stores handed to the rest of the application.
#[derive(Debug)]
pub struct OpenedStores {
    /// Sync-capable store.
    pub shared: RecordStore,
    /// Never-synced store holding the local-only entities.
    pub private: RecordStore,
    /// How the stores were opened.
    pub layout: StoreLayout,
    /// Migrations run while opening, shared store first.
    pub migrations: Vec<MigrationOutcome>,
}

impl OpenedStores {
    /// A store by role.
    pub fn store(&self, role: StoreRole) -> &RecordStore {
        match role {
            StoreRole::Shared => &self.shared,
            StoreRole::Private => &self.private,
        }
    }

    /// The store that hosts an entity.
    pub fn store_for(&self, entity: &str) -> &RecordStore {
        if self.layout.private.hosting.hosts(entity) {
            &self.private
        } else {
            &self.shared
        }
    }

    /// Mutable access to the store that hosts an entity.
    pub fn store_for_mut(&mut self, entity: &str) -> &mut RecordStore {
        if self.layout.private.hosting.hosts(entity) {
            &mut self.private
        } else {
            &mut self.shared
        }
    }
}

/// What is on disk for one store, read without opening it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    /// Which store.
    pub role: StoreRole,
    /// Store name.
    pub name: String,
    /// Primary file path.
    pub path: PathBuf,
    /// Version in the store header, if the store exists.
    pub version: Option<VersionNumber>,
    /// Checkpoint generation, if the store exists.
    pub generation: Option<u64>,
    /// Version recorded after the last successful open.
    pub last_known_version: Option<VersionNumber>,
    /// Backup a pending restore points at.
    pub pending_restore: Option<PathBuf>,
    /// Number of backups kept.
    pub backups: usize,
}

impl StoreStatus {
    /// Check whether opening the store would run migrations.
    pub fn needs_migration(&self, current: VersionNumber) -> bool {
        self.version.is_some_and(|v| v != current)
    }
}

/// Opens the application's stores.
///
/// Startup is two phases: [`Self::resolve_pending_state`] executes any
/// scheduled restore while nothing is open, then [`Self::open_store`] opens
/// and migrates. [`Self::open`] runs both. A container opens once.
#[derive(Debug)]
pub struct PersistentStoreContainer {
    config: StoreConfig,
    fs: Arc<dyn FileSystem>,
    kv: Arc<dyn KeyValueStore>,
    registry: Arc<SchemaRegistry>,
    catalog: Arc<StageCatalog>,
    tiers: TierConfigurator,
    logger: Arc<MigrationLogger>,
    shared_backups: Arc<BackupManager>,
    private_backups: Arc<BackupManager>,
    states: Mutex<Vec<ContainerState>>,
    /// Keep the sled::Db handle alive for the settings store.
    _settings_db: Option<sled::Db>,
}

impl PersistentStoreContainer {
    /// Create a container over explicit ports and schema history.
    pub fn new(
        config: StoreConfig,
        fs: Arc<dyn FileSystem>,
        kv: Arc<dyn KeyValueStore>,
        registry: Arc<SchemaRegistry>,
        catalog: Arc<StageCatalog>,
        policy: TierPolicy,
    ) -> Result<Self, ContainerError> {
        if config.shared_store_name == config.private_store_name {
            return Err(ContainerError::invalid(format!(
                "shared and private stores are both named '{}'",
                config.shared_store_name
            )));
        }
        policy
            .validate(&registry)
            .map_err(|e| ContainerError::invalid(format!("invalid tier policy: {}", e)))?;

        let tiers = TierConfigurator::new(
            policy,
            &config.shared_store_name,
            &config.private_store_name,
        );
        let backups = |name: &str| {
            Arc::new(BackupManager::new(
                fs.clone(),
                kv.clone(),
                StoreLocation::new(&config.data_dir, name),
                config.backup_config(),
            ))
        };
        let shared_backups = backups(&config.shared_store_name);
        let private_backups = backups(&config.private_store_name);

        Ok(Self {
            logger: Arc::new(MigrationLogger::new(kv.clone())),
            config,
            fs,
            kv,
            registry,
            catalog,
            tiers,
            shared_backups,
            private_backups,
            states: Mutex::new(vec![ContainerState::Unopened]),
            _settings_db: None,
        })
    }

    /// Create the habit tracker's container on the OS file system, with
    /// settings in a sled database under the data directory.
    pub fn for_application(config: StoreConfig) -> Result<Self, ContainerError> {
        let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem::new());
        fs.create_dir_all(&config.data_dir)
            .map_err(|e| ContainerError::init("failed to create data directory", e.into()))?;

        let settings_db = sled::open(config.settings_path())
            .map_err(|e| ContainerError::init("failed to open settings", e.into()))?;
        let kv = SledKeyValueStore::open(&settings_db)
            .map_err(|e| ContainerError::init("failed to open settings", e))?;

        let registry = app::build_registry()
            .map_err(|e| ContainerError::invalid(format!("invalid schema registry: {}", e)))?;
        let catalog = app::build_stage_catalog(&registry)
            .map_err(|e| ContainerError::invalid(format!("invalid stage catalog: {}", e)))?;

        let mut container = Self::new(
            config,
            fs,
            Arc::new(kv),
            Arc::new(registry),
            Arc::new(catalog),
            app::tier_policy(),
        )?;
        container._settings_db = Some(settings_db);
        Ok(container)
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Get the stage catalog.
    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    /// Get the tier configurator.
    pub fn tiers(&self) -> &TierConfigurator {
        &self.tiers
    }

    /// Get the migration logger.
    pub fn logger(&self) -> &MigrationLogger {
        &self.logger
    }

    /// Get the backup manager of a store.
    pub fn backups(&self, role: StoreRole) -> &BackupManager {
        match role {
            StoreRole::Shared => &self.shared_backups,
            StoreRole::Private => &self.private_backups,
        }
    }

    /// Current state.
    pub fn state(&self) -> ContainerState {
        self.states
            .lock()
            .last()
            .copied()
            .unwrap_or(ContainerState::Unopened)
    }

    /// Every state the container has been in, oldest first.
    pub fn transitions(&self) -> Vec<ContainerState> {
        self.states.lock().clone()
    }

    /// Version recorded for a store after its last successful open.
    pub fn last_known_version(&self, store_name: &str) -> Result<Option<VersionNumber>, ContainerError> {
        let value = self
            .kv
            .get_string(&last_version_key(store_name))
            .map_err(|e| ContainerError::init("failed to read settings", e))?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Describe both stores without opening them.
    pub fn status(&self) -> Result<Vec<StoreStatus>, ContainerError> {
        [StoreRole::Shared, StoreRole::Private]
            .into_iter()
            .map(|role| self.store_status(role))
            .collect()
    }

    /// Execute any scheduled restore. Must complete before
    /// [`Self::open_store`].
    pub fn resolve_pending_state(&self) -> Result<PendingResolved, ContainerError> {
        self.check_unopened()?;
        self.fs.create_dir_all(&self.config.data_dir).map_err(|e| {
            self.fail(ContainerError::init("failed to create data directory", e.into()))
        })?;

        for backups in [&self.shared_backups, &self.private_backups] {
            let pending = backups
                .pending_restore()
                .map_err(|e| self.fail(e.into()))?;
            let Some(path) = pending else {
                continue;
            };

            self.transition(ContainerState::RestoringPending);
            backups
                .execute_pending_restore_if_needed()
                .map_err(|e| self.fail(e.into()))?;
            info!(
                store = backups.location().name(),
                path = %path.display(),
                "Pending restore complete"
            );
            self.transition(ContainerState::Unopened);
        }
        Ok(PendingResolved { _resolved: () })
    }

    /// Open both stores, migrating each to the current version, and move
    /// newly local-only tables into the private store.
    pub fn open_store(&self, _resolved: PendingResolved) -> Result<OpenedStores, ContainerError> {
        self.check_unopened()?;
        let current = self.registry.current().version;
        let layout = self.tiers.store_layout(current, self.config.sync_available);

        let mut migrations = Vec::new();
        let mut shared = self.open_plan(&layout.shared, &self.shared_backups, &mut migrations)?;
        let mut private = self.open_plan(&layout.private, &self.private_backups, &mut migrations)?;

        for entity in self.tiers.policy().pinned_at(current) {
            if !shared.has_table(&entity) {
                continue;
            }
            shared.relocate_table(&entity, &mut private).map_err(|e| {
                self.fail(ContainerError::init(
                    format!("failed to move {} to the private store", entity),
                    e,
                ))
            })?;
        }

        for store in [&shared, &private] {
            self.kv
                .set_string(
                    &last_version_key(store.location().name()),
                    &store.version().to_string(),
                )
                .map_err(|e| self.fail(ContainerError::init("failed to write settings", e)))?;
        }

        self.transition(ContainerState::Open);
        info!(
            version = %current,
            sync = self.config.sync_available,
            migrations = migrations.len(),
            "Stores open"
        );
        Ok(OpenedStores {
            shared,
            private,
            layout,
            migrations,
        })
    }

    /// Resolve pending state, then open the stores.
    pub fn open(&self) -> Result<OpenedStores, ContainerError> {
        let resolved = self.resolve_pending_state()?;
        self.open_store(resolved)
    }

    fn open_plan(
        &self,
        plan: &StorePlan,
        backups: &Arc<BackupManager>,
        migrations: &mut Vec<MigrationOutcome>,
    ) -> Result<RecordStore, ContainerError> {
        let current = self.registry.current();
        let location = StoreLocation::new(&self.config.data_dir, &plan.name);

        if !RecordStore::exists(self.fs.as_ref(), &location) {
            return RecordStore::create(self.fs.clone(), location, current, plan.hosting.clone())
                .map_err(|e| {
                    self.fail(ContainerError::init(
                        format!("failed to create store {}", plan.name),
                        e,
                    ))
                });
        }

        let mut store = RecordStore::open(self.fs.clone(), location).map_err(|e| {
            self.fail(ContainerError::init(
                format!("failed to open store {}", plan.name),
                e,
            ))
        })?;
        store.set_hosting(plan.hosting.clone());

        let from = store.version();
        if from != current.version {
            self.transition(ContainerState::Migrating);
            info!(
                store = %plan.name,
                from_version = %from,
                to_version = %current.version,
                "Migrating store"
            );
        }

        match self.engine_for(backups).migrate(&mut store, from, current.version) {
            Ok(outcome) => {
                if !outcome.is_noop() {
                    migrations.push(outcome);
                }
                Ok(store)
            }
            Err(source) => {
                drop(store);
                let restore = self.auto_restore(&source, backups);
                Err(self.fail(ContainerError::MigrationFailed { source, restore }))
            }
        }
    }

    fn engine_for(&self, backups: &Arc<BackupManager>) -> MigrationEngine {
        let snapshots = self.config.snapshot_before_custom_stages;
        let engine = MigrationEngine::new(self.registry.clone(), self.catalog.clone())
            .with_logger(self.logger.clone())
            .with_config(MigrationConfig {
                snapshot_before_custom_stages: snapshots,
            });
        if snapshots {
            engine.with_safety_net(backups.clone())
        } else {
            engine
        }
    }

    /// Restore the newest snapshot this run took after a stage failed. The
    /// store must be closed. Older backups are never used: the engine has
    /// already checkpointed every completed stage.
    fn auto_restore(&self, error: &MigrationError, backups: &BackupManager) -> RestoreOutcome {
        if !self.config.auto_restore {
            return RestoreOutcome::NotAttempted;
        }
        let MigrationError::MigrationFailed { snapshots, .. } = error else {
            return RestoreOutcome::NotAttempted;
        };
        let Some(snapshot) = snapshots.last() else {
            debug!(
                store = backups.location().name(),
                "No snapshot taken during the failed migration; store left at last completed stage"
            );
            return RestoreOutcome::NotAttempted;
        };
        match backups
            .record_at(snapshot)
            .and_then(|record| backups.restore(&record).map(|()| record))
        {
            Ok(record) => {
                warn!(
                    store = backups.location().name(),
                    path = %record.store_path.display(),
                    "Restored pre-stage snapshot after failed migration"
                );
                RestoreOutcome::Restored(record.store_path)
            }
            Err(e) => {
                error!(store = backups.location().name(), error = %e, "Automatic restore failed");
                RestoreOutcome::Failed(e.to_string())
            }
        }
    }

    fn store_status(&self, role: StoreRole) -> Result<StoreStatus, ContainerError> {
        let backups = self.backups(role);
        let location = backups.location();
        let info = if RecordStore::exists(self.fs.as_ref(), location) {
            Some(
                RecordStore::inspect(self.fs.as_ref(), location)
                    .map_err(|e| ContainerError::init("failed to read store header", e))?,
            )
        } else {
            None
        };
        Ok(StoreStatus {
            role,
            name: location.name().to_string(),
            path: location.primary_path(),
            version: info.as_ref().map(|i| i.version),
            generation: info.as_ref().map(|i| i.generation),
            last_known_version: self.last_known_version(location.name())?,
            pending_restore: backups.pending_restore()?,
            backups: backups.list_backups()?.len(),
        })
    }

    fn check_unopened(&self) -> Result<(), ContainerError> {
        match self.state() {
            ContainerState::Unopened => Ok(()),
            state => Err(ContainerError::invalid(format!(
                "cannot open a container that is {}",
                state
            ))),
        }
    }

    fn transition(&self, to: ContainerState) {
        let mut states = self.states.lock();
        let from = states.last().copied().unwrap_or(ContainerState::Unopened);
        if from != to {
            states.push(to);
            info!(from = %from, to = %to, "Container state changed");
        }
    }

    fn fail(&self, err: ContainerError) -> ContainerError {
        self.transition(ContainerState::Failed);
        error!(error = %err, "Store container failed");
        err
    }
}
