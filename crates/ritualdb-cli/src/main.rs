//! RitualDB Command-Line Client
//!
//! Inspects and maintains the on-device stores: status, migrations,
//! backups, history and tier assignment.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod formatter;

use clap::Parser;
use commands::Command;
use formatter::OutputFormat;
use ritualdb::{PersistentStoreContainer, StoreConfig};
use std::path::PathBuf;

/// RitualDB Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "ritualdb")]
#[command(version, about = "RitualDB store maintenance")]
pub struct Args {
    /// Directory holding the stores, backups and settings
    #[arg(short = 'd', long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Treat the sync backend as available
    #[arg(long)]
    pub sync: bool,

    /// Backups kept per store
    #[arg(long, default_value_t = ritualdb::DEFAULT_BACKUP_RETENTION)]
    pub retention: usize,

    /// Do not restore the newest backup after a failed migration
    #[arg(long)]
    pub no_auto_restore: bool,

    /// Do not snapshot before custom migration stages
    #[arg(long)]
    pub no_snapshots: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Convert CLI arguments to a store configuration.
    pub fn into_config(&self) -> StoreConfig {
        StoreConfig::new(&self.data_dir)
            .with_sync(self.sync)
            .with_backup_retention(self.retention)
            .with_auto_restore(!self.no_auto_restore)
            .with_snapshots(!self.no_snapshots)
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ritualdb=info,ritualdb_backup=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    match run(&args, &*formatter) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}

fn run(
    args: &Args,
    formatter: &dyn formatter::Formatter,
) -> Result<String, Box<dyn std::error::Error>> {
    let config = args.into_config();
    tracing::debug!(data_dir = %config.data_dir.display(), "Using data directory");

    let container = PersistentStoreContainer::for_application(config)?;
    Ok(commands::execute(&container, &args.command, formatter)?)
}
