//! Persistent migration history.

use super::event::{MigrationEvent, MigrationStatus};
use crate::catalog::VersionNumber;
use crate::error::Error;
use crate::port::{KeyValueStore, MIGRATION_HISTORY_KEY};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of events kept.
pub const HISTORY_LIMIT: usize = 50;

/// Aggregate view over the recorded history.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatistics {
    /// Recorded events.
    pub total: usize,
    /// Succeeded events.
    pub succeeded: usize,
    /// Failed events.
    pub failed: usize,
    /// Events still marked started.
    pub in_progress: usize,
    /// Mean duration over finished events.
    pub average_duration_ms: Option<f64>,
    /// Most recently recorded event.
    pub last_event: Option<MigrationEvent>,
}

/// Records stage attempts under a single settings key as a JSON array.
///
/// At most one event is kept per stage of each store: a new event for the
/// same store and version pair replaces the old one, keeping its id when both
/// share a start time. The oldest events are dropped beyond the limit.
#[derive(Debug)]
pub struct MigrationLogger {
    kv: Arc<dyn KeyValueStore>,
    limit: usize,
    io: Mutex<()>,
}

impl MigrationLogger {
    /// Create a logger over a settings store.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            limit: HISTORY_LIMIT,
            io: Mutex::new(()),
        }
    }

    /// Set how many events are kept.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Record that a stage started.
    pub fn log_start(
        &self,
        store: &str,
        from: VersionNumber,
        to: VersionNumber,
        started_at: DateTime<Utc>,
        description: Option<String>,
    ) -> Result<MigrationEvent, Error> {
        self.record(MigrationEvent::started(store, from, to, started_at, description))
    }

    /// Record that a stage succeeded.
    pub fn log_success(
        &self,
        store: &str,
        from: VersionNumber,
        to: VersionNumber,
        started_at: DateTime<Utc>,
        description: Option<String>,
    ) -> Result<MigrationEvent, Error> {
        let event = MigrationEvent::started(store, from, to, started_at, description)
            .finish(MigrationStatus::Succeeded, None);
        self.record(event)
    }

    /// Record that a stage failed.
    pub fn log_failure(
        &self,
        store: &str,
        from: VersionNumber,
        to: VersionNumber,
        started_at: DateTime<Utc>,
        error: &str,
        description: Option<String>,
    ) -> Result<MigrationEvent, Error> {
        let event = MigrationEvent::started(store, from, to, started_at, description)
            .finish(MigrationStatus::Failed, Some(error.to_string()));
        self.record(event)
    }

    /// All recorded events, oldest first.
    pub fn history(&self) -> Result<Vec<MigrationEvent>, Error> {
        let _guard = self.io.lock();
        self.load()
    }

    /// Events recorded for one stage, across stores.
    pub fn events_for(
        &self,
        from: VersionNumber,
        to: VersionNumber,
    ) -> Result<Vec<MigrationEvent>, Error> {
        Ok(self
            .history()?
            .into_iter()
            .filter(|e| e.is_stage(from, to))
            .collect())
    }

    /// Forget every recorded event.
    pub fn clear_history(&self) -> Result<(), Error> {
        let _guard = self.io.lock();
        self.kv.remove(MIGRATION_HISTORY_KEY)?;
        debug!("Cleared migration history");
        Ok(())
    }

    /// Aggregate counts and durations.
    pub fn statistics(&self) -> Result<MigrationStatistics, Error> {
        let history = self.history()?;

        let count = |status| history.iter().filter(|e| e.status == status).count();
        let durations: Vec<i64> = history.iter().filter_map(|e| e.duration_ms).collect();
        let average_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        };

        Ok(MigrationStatistics {
            total: history.len(),
            succeeded: count(MigrationStatus::Succeeded),
            failed: count(MigrationStatus::Failed),
            in_progress: count(MigrationStatus::Started),
            average_duration_ms,
            last_event: history.last().cloned(),
        })
    }

    /// One line describing the history.
    pub fn summary(&self) -> Result<String, Error> {
        let stats = self.statistics()?;
        let Some(last) = &stats.last_event else {
            return Ok("No migrations recorded".to_string());
        };

        let mut summary = format!(
            "{} migration(s) recorded: {} succeeded, {} failed, {} in progress",
            stats.total, stats.succeeded, stats.failed, stats.in_progress
        );
        if let Some(avg) = stats.average_duration_ms {
            summary.push_str(&format!("; average {:.0} ms", avg));
        }
        summary.push_str(&format!(
            "; last {} -> {} {}",
            last.from_version, last.to_version, last.status
        ));
        Ok(summary)
    }

    fn record(&self, mut event: MigrationEvent) -> Result<MigrationEvent, Error> {
        let _guard = self.io.lock();
        let mut history = match self.load() {
            Err(Error::Deserialization(e)) => {
                warn!(error = %e, "Discarding unreadable migration history");
                Vec::new()
            }
            other => other?,
        };

        if let Some(existing) = history
            .iter()
            .find(|e| event.supersedes(e) && e.start_time == event.start_time)
        {
            event.id = existing.id.clone();
        }
        history.retain(|e| !event.supersedes(e));
        history.push(event.clone());

        if history.len() > self.limit {
            let excess = history.len() - self.limit;
            history.drain(..excess);
        }

        let bytes =
            serde_json::to_vec(&history).map_err(|e| Error::Serialization(e.to_string()))?;
        self.kv.set(MIGRATION_HISTORY_KEY, &bytes)?;

        debug!(
            store = %event.store,
            from_version = %event.from_version,
            to_version = %event.to_version,
            status = %event.status,
            "Recorded migration event"
        );
        Ok(event)
    }

    fn load(&self) -> Result<Vec<MigrationEvent>, Error> {
        match self.kv.get(MIGRATION_HISTORY_KEY)? {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                warn!(error = %e, "Migration history is unreadable");
                Error::Deserialization(e.to_string())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MemoryKeyValueStore;
    use chrono::Duration;

    fn v(major: u32) -> VersionNumber {
        VersionNumber::new(major, 0, 0)
    }

    fn logger() -> MigrationLogger {
        MigrationLogger::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn test_success_replaces_started_event() {
        let logger = logger();
        let start = Utc::now();

        let started = logger.log_start("Ritualist", v(1), v(2), start, None).unwrap();
        let done = logger.log_success("Ritualist", v(1), v(2), start, None).unwrap();

        let history = logger.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(done.id, started.id);
        assert_eq!(history[0].status, MigrationStatus::Succeeded);
        assert_eq!(history[0].start_time, start);
    }

    #[test]
    fn test_failure_records_error_and_duration() {
        let logger = logger();
        let start = Utc::now() - Duration::milliseconds(40);

        logger.log_start("Ritualist", v(4), v(5), start, None).unwrap();
        let event = logger
            .log_failure("Ritualist", v(4), v(5), start, "hook failed", Some("Start dates".into()))
            .unwrap();

        assert_eq!(event.status, MigrationStatus::Failed);
        assert_eq!(event.error.as_deref(), Some("hook failed"));
        assert_eq!(
            event.duration_ms,
            Some((event.end_time.unwrap() - start).num_milliseconds())
        );
        assert_eq!(logger.events_for(v(4), v(5)).unwrap(), vec![event]);
    }

    #[test]
    fn test_history_is_capped() {
        let logger = logger().with_limit(3);
        for major in 1..=5 {
            logger
                .log_success("Ritualist", v(major), v(major + 1), Utc::now(), None)
                .unwrap();
        }

        let history = logger.history().unwrap();
        let firsts: Vec<_> = history.iter().map(|e| e.from_version).collect();
        assert_eq!(firsts, vec![v(3), v(4), v(5)]);
    }

    #[test]
    fn test_statistics_and_summary() {
        let logger = logger();
        assert_eq!(logger.summary().unwrap(), "No migrations recorded");

        let start = Utc::now();
        logger.log_success("Ritualist", v(1), v(2), start, None).unwrap();
        logger.log_failure("Ritualist", v(2), v(3), start, "boom", None).unwrap();
        logger.log_start("Ritualist", v(3), v(4), start, None).unwrap();

        let stats = logger.statistics().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_progress, 1);
        assert!(stats.average_duration_ms.is_some());
        assert_eq!(stats.last_event.unwrap().from_version, v(3));

        let summary = logger.summary().unwrap();
        assert!(summary.starts_with("3 migration(s) recorded"));
        assert!(summary.ends_with("last 3.0.0 -> 4.0.0 started"));
    }

    #[test]
    fn test_clear_history() {
        let logger = logger();
        logger.log_success("Ritualist", v(1), v(2), Utc::now(), None).unwrap();
        logger.clear_history().unwrap();
        assert!(logger.history().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_history_is_an_error() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(MIGRATION_HISTORY_KEY, b"not json").unwrap();
        let logger = MigrationLogger::new(kv);

        assert!(matches!(logger.history(), Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_recording_replaces_unreadable_history() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(MIGRATION_HISTORY_KEY, b"not json").unwrap();
        let logger = MigrationLogger::new(kv);

        logger.log_start("Ritualist", v(1), v(2), Utc::now(), None).unwrap();
        let history = logger.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MigrationStatus::Started);
    }

    #[test]
    fn test_stores_keep_separate_events() {
        let logger = logger();
        let start = Utc::now();

        logger.log_success("Ritualist", v(7), v(8), start, None).unwrap();
        logger.log_start("Private", v(7), v(8), start, None).unwrap();
        logger
            .log_failure("Private", v(7), v(8), start, "boom", None)
            .unwrap();

        let events = logger.events_for(v(7), v(8)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].store, "Ritualist");
        assert_eq!(events[0].status, MigrationStatus::Succeeded);
        assert_eq!(events[1].store, "Private");
        assert_eq!(events[1].status, MigrationStatus::Failed);
    }
}
