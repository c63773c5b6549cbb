//! Migration history.

mod event;
mod logger;

pub use event::{MigrationEvent, MigrationStatus};
pub use logger::{MigrationLogger, MigrationStatistics, HISTORY_LIMIT};
