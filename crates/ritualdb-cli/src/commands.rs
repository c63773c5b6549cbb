//! Subcommands and their execution.

use crate::formatter::{Formatter, Report};
use clap::{Subcommand, ValueEnum};
use ritualdb::{ContainerError, PersistentStoreContainer, StoreRole};
use ritualdb_backup::{BackupError, BackupRecord, RestoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Container failed to start or open.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Backup could not be created or listed.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Backup could not be restored.
    #[error(transparent)]
    Restore(#[from] RestoreError),

    /// Settings store error.
    #[error(transparent)]
    Storage(#[from] ritualdb_core::Error),
}

/// Store selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreArg {
    /// The sync-capable store
    Shared,
    /// The never-synced store
    Private,
}

impl From<StoreArg> for StoreRole {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Shared => StoreRole::Shared,
            StoreArg::Private => StoreRole::Private,
        }
    }
}

/// Top-level subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Describe both stores without opening them
    Status,
    /// Open the stores, running any pending restore and migrations
    Open,
    /// Manage store backups
    Backup {
        /// Store to operate on
        #[arg(long, value_enum, default_value_t = StoreArg::Shared)]
        store: StoreArg,

        #[command(subcommand)]
        action: BackupAction,
    },
    /// Show the recorded migration history
    History {
        /// Remove every recorded event
        #[arg(long)]
        clear: bool,
    },
    /// Show where each entity of the current schema is stored
    Tiers,
    /// List schema versions and migration stages
    Registry,
}

/// Backup subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum BackupAction {
    /// Snapshot the store now
    Create,
    /// List backups, newest first
    List,
    /// Restore a backup immediately
    Restore {
        /// Restore the newest backup
        #[arg(long, conflicts_with = "path")]
        latest: bool,

        /// Backup file to restore
        #[arg(required_unless_present = "latest")]
        path: Option<PathBuf>,
    },
    /// Restore a backup on the next open
    Schedule {
        /// Backup file to restore
        path: PathBuf,
    },
    /// Cancel a scheduled restore
    Cancel,
    /// Delete every backup of the store
    Purge,
}

/// Run a command against a container and render its output.
pub fn execute(
    container: &PersistentStoreContainer,
    command: &Command,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    match command {
        Command::Status => status(container, formatter),
        Command::Open => open(container, formatter),
        Command::Backup { store, action } => backup(container, (*store).into(), action, formatter),
        Command::History { clear } => history(container, *clear, formatter),
        Command::Tiers => Ok(formatter.format_report(&tiers(container))),
        Command::Registry => Ok(formatter.format_report(&registry(container))),
    }
}

fn status(
    container: &PersistentStoreContainer,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    let current = container.registry().current().version;
    let mut report = Report::new(&[
        "Role",
        "Store",
        "Version",
        "Generation",
        "Last Known",
        "Needs Migration",
        "Pending Restore",
        "Backups",
    ]);
    for status in container.status()? {
        report.push(vec![
            Some(status.role.to_string()),
            Some(status.name.clone()),
            status.version.map(|v| v.to_string()),
            status.generation.map(|g| g.to_string()),
            status.last_known_version.map(|v| v.to_string()),
            Some(status.needs_migration(current).to_string()),
            status.pending_restore.map(|p| p.display().to_string()),
            Some(status.backups.to_string()),
        ]);
    }
    let footer = format!("Current schema version {}", current);
    Ok(formatter.format_report(&report.with_footer(footer)))
}

fn open(
    container: &PersistentStoreContainer,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    let stores = container.open()?;

    let mut report = Report::new(&["From", "To", "Custom", "Grade", "Duration Ms", "Snapshot"]);
    for applied in stores.migrations.iter().flat_map(|m| &m.stages) {
        report.push(vec![
            Some(applied.stage.from.to_string()),
            Some(applied.stage.to.to_string()),
            Some(applied.custom.to_string()),
            Some(applied.grade.to_string()),
            Some(applied.duration_ms.to_string()),
            applied.snapshot.as_ref().map(|p| p.display().to_string()),
        ]);
    }

    let footer = format!(
        "Opened {} and {} at {} ({} stage(s) applied)",
        stores.shared.location().name(),
        stores.private.location().name(),
        stores.shared.version(),
        report.rows.len()
    );
    Ok(formatter.format_report(&report.with_footer(footer)))
}

fn backup(
    container: &PersistentStoreContainer,
    role: StoreRole,
    action: &BackupAction,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    let backups = container.backups(role);
    let message = match action {
        BackupAction::Create => {
            let record = backups.create_backup()?;
            format!("Created backup {}", record.store_path.display())
        }
        BackupAction::List => {
            let records = backups.list_backups()?;
            let pending = backups.pending_restore()?;
            let report = backup_report(&records, pending.as_deref());
            let footer = format!(
                "{} backup(s) in {}",
                records.len(),
                backups.backup_directory().display()
            );
            return Ok(formatter.format_report(&report.with_footer(footer)));
        }
        BackupAction::Restore { latest: true, .. } => {
            let record = backups.restore_latest_backup()?;
            format!("Restored {}", record.store_path.display())
        }
        BackupAction::Restore { path, .. } => {
            let Some(path) = path else {
                return Err(RestoreError::NoBackupAvailable.into());
            };
            let record = backups.record_at(path)?;
            backups.restore(&record)?;
            format!("Restored {}", record.store_path.display())
        }
        BackupAction::Schedule { path } => {
            let record = backups.record_at(path)?;
            backups.schedule_pending_restore(&record)?;
            format!("Scheduled restore of {} on next open", record.store_path.display())
        }
        BackupAction::Cancel => {
            if backups.cancel_pending_restore()? {
                "Cancelled pending restore".to_string()
            } else {
                "No restore pending".to_string()
            }
        }
        BackupAction::Purge => {
            let deleted = backups.delete_all_backups()?;
            format!("Deleted {} backup(s)", deleted)
        }
    };
    Ok(formatter.format_message(&message))
}

fn backup_report(records: &[BackupRecord], pending: Option<&std::path::Path>) -> Report {
    let mut report = Report::new(&["Created At", "File", "Companions", "Manifest", "Pending"]);
    for record in records {
        report.push(vec![
            Some(record.created_at.to_rfc3339()),
            Some(record.file_name()),
            Some(record.companion_paths.len().to_string()),
            Some(record.manifest_path.is_some().to_string()),
            Some((pending == Some(record.store_path.as_path())).to_string()),
        ]);
    }
    report
}

fn history(
    container: &PersistentStoreContainer,
    clear: bool,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    let logger = container.logger();
    if clear {
        logger.clear_history()?;
        return Ok(formatter.format_message("Cleared migration history"));
    }

    let mut report = Report::new(&[
        "Store",
        "From",
        "To",
        "Status",
        "Started",
        "Duration Ms",
        "Error",
    ]);
    for event in logger.history()? {
        report.push(vec![
            (!event.store.is_empty()).then_some(event.store),
            Some(event.from_version.to_string()),
            Some(event.to_version.to_string()),
            Some(event.status.to_string()),
            Some(event.start_time.to_rfc3339()),
            event.duration_ms.map(|d| d.to_string()),
            event.error,
        ]);
    }
    Ok(formatter.format_report(&report.with_footer(logger.summary()?)))
}

fn tiers(container: &PersistentStoreContainer) -> Report {
    let config = container.config();
    let current = container.registry().current();
    let layout = container.tiers().store_layout(current.version, config.sync_available);

    let mut report = Report::new(&["Entity", "Tier", "Store"]);
    for (entity, tier) in container
        .tiers()
        .tier_assignments(current, config.sync_available)
    {
        let plan = if layout.private.hosting.hosts(&entity) {
            &layout.private
        } else {
            &layout.shared
        };
        report.push(vec![Some(entity), Some(tier.to_string()), Some(plan.name.clone())]);
    }
    let sync = if config.sync_available { "available" } else { "unavailable" };
    report.with_footer(format!("Sync {} at schema version {}", sync, current.version))
}

fn registry(container: &PersistentStoreContainer) -> Report {
    let registry = container.registry();
    let catalog = container.catalog();

    let mut report = Report::new(&["Version", "Checksum", "Entities", "Stage", "Description"]);
    for schema in registry.versions() {
        let version = schema.version;
        let stage = catalog
            .stages()
            .iter()
            .find(|s| s.to == version)
            .map(|s| if s.is_custom() { "custom" } else { "lightweight" });
        report.push(vec![
            Some(version.to_string()),
            Some(schema.structural_checksum().short()),
            Some(schema.entity_names().len().to_string()),
            stage.map(str::to_string),
            registry.step_to(version).map(|s| s.description.clone()),
        ]);
    }
    report.with_footer(format!(
        "{} version(s), current {}",
        registry.versions().len(),
        registry.current().version
    ))
}
