//! Migration history events.

use crate::catalog::VersionNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a recorded stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// The stage started and has not finished.
    Started,
    /// The stage completed.
    Succeeded,
    /// The stage failed.
    Failed,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::Started => write!(f, "started"),
            MigrationStatus::Succeeded => write!(f, "succeeded"),
            MigrationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One recorded stage attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEvent {
    /// Unique event id (hex).
    pub id: String,
    /// Store the stage ran against. Empty in histories written before
    /// events were scoped to a store.
    #[serde(default)]
    pub store: String,
    /// Stage source version.
    pub from_version: VersionNumber,
    /// Stage target version.
    pub to_version: VersionNumber,
    /// Current status.
    pub status: MigrationStatus,
    /// When the stage started.
    pub start_time: DateTime<Utc>,
    /// When the stage finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Whole milliseconds between start and end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Description of the target version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MigrationEvent {
    /// Create a started event.
    pub fn started(
        store: impl Into<String>,
        from_version: VersionNumber,
        to_version: VersionNumber,
        start_time: DateTime<Utc>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: generate_event_id(),
            store: store.into(),
            from_version,
            to_version,
            status: MigrationStatus::Started,
            start_time,
            end_time: None,
            duration_ms: None,
            error: None,
            description,
        }
    }

    /// Mark the event finished now.
    pub fn finish(mut self, status: MigrationStatus, error: Option<String>) -> Self {
        let end = Utc::now().max(self.start_time);
        self.status = status;
        self.end_time = Some(end);
        self.duration_ms = Some((end - self.start_time).num_milliseconds());
        self.error = error;
        self
    }

    /// Check if the event is for a given stage, in any store.
    pub fn is_stage(&self, from: VersionNumber, to: VersionNumber) -> bool {
        self.from_version == from && self.to_version == to
    }

    /// Whether `other` records the same stage of the same store.
    pub fn supersedes(&self, other: &MigrationEvent) -> bool {
        self.store == other.store && other.is_stage(self.from_version, self.to_version)
    }
}

/// Generate a unique event id.
fn generate_event_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = Utc::now().timestamp_micros() as u64;
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&timestamp.to_be_bytes());
    id[8..16].copy_from_slice(&counter.to_be_bytes());
    hex::encode(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn v(major: u32) -> VersionNumber {
        VersionNumber::new(major, 0, 0)
    }

    #[test]
    fn test_event_ids_unique() {
        let a = MigrationEvent::started("Ritualist", v(1), v(2), Utc::now(), None);
        let b = MigrationEvent::started("Ritualist", v(1), v(2), Utc::now(), None);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
    }

    #[test]
    fn test_finish_computes_duration() {
        let start = Utc::now() - Duration::milliseconds(250);
        let event = MigrationEvent::started("Ritualist", v(1), v(2), start, None)
            .finish(MigrationStatus::Succeeded, None);

        let end = event.end_time.unwrap();
        assert_eq!(
            event.duration_ms,
            Some((end - event.start_time).num_milliseconds())
        );
        assert!(event.duration_ms.unwrap() >= 250);
    }

    #[test]
    fn test_json_shape() {
        let event = MigrationEvent::started("Ritualist", v(4), v(5), Utc::now(), Some("Start dates".into()))
            .finish(MigrationStatus::Failed, Some("hook failed".into()));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["store"], "Ritualist");
        assert_eq!(json["from_version"], "4.0.0");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "hook failed");

        let back: MigrationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_unscoped_event_loads() {
        let json = serde_json::json!({
            "id": "00",
            "from_version": "1.0.0",
            "to_version": "2.0.0",
            "status": "succeeded",
            "start_time": "2024-01-01T00:00:00Z",
        });
        let event: MigrationEvent = serde_json::from_value(json).unwrap();
        assert!(event.store.is_empty());
        assert!(event.is_stage(v(1), v(2)));
    }

    #[test]
    fn test_supersedes_is_per_store() {
        let shared = MigrationEvent::started("Ritualist", v(7), v(8), Utc::now(), None);
        let private = MigrationEvent::started("Private", v(7), v(8), Utc::now(), None);
        let retry = MigrationEvent::started("Ritualist", v(7), v(8), Utc::now(), None);

        assert!(!private.supersedes(&shared));
        assert!(retry.supersedes(&shared));
        assert!(!retry.supersedes(&private));
    }
}
