use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{LogEntry, TrackerEvent, TrackerEventKind, TrackerEventPayload};
use crate::storage::{Storage, TRACKER_KEY};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::models::{Level, Timing};
    use crate::storage::{MemoryStorage, SubscriptionId, Setter};

    fn entry(timestamp: &str, activity: &str) -> LogEntry {
        LogEntry {
            timestamp: timestamp.to_string(),
            activity: activity.to_string(),
            timing: Timing::After,
            energy: Level::default(),
            focus: Level::default(),
        }
    }

    #[test]
    fn test_append_prepends_newest_first() {
        let a = entry("2024-01-01T09:00:00.000Z", "focus");
        let b = entry("2024-01-01T10:00:00.000Z", "meal");

        let logs = append_or_update_log(&[], a.clone(), None);
        assert_eq!(logs, vec![a.clone()]);

        let logs = append_or_update_log(&logs, b.clone(), None);
        assert_eq!(logs, vec![b, a]);
    }

    #[test]
    fn test_update_keeps_position() {
        let a = entry("2024-01-01T09:00:00.000Z", "focus");
        let b = entry("2024-01-01T08:00:00.000Z", "wakeup");
        let c = entry("2024-01-01T11:00:00.000Z", "exercise");
        let logs = vec![a.clone(), b.clone()];

        let updated = append_or_update_log(&logs, c.clone(), Some(&a.timestamp));
        assert_eq!(updated, vec![c, b]);
        // Input untouched
        assert_eq!(logs[0], a);
    }

    #[test]
    fn test_update_with_unknown_timestamp_changes_nothing() {
        let a = entry("2024-01-01T09:00:00.000Z", "focus");
        let logs = vec![a.clone()];
        let updated = append_or_update_log(&logs, entry("x", "meal"), Some("missing"));
        assert_eq!(updated, vec![a]);
    }

    #[test]
    fn test_delete_log() {
        let a = entry("2024-01-01T09:00:00.000Z", "focus");
        let b = entry("2024-01-01T10:00:00.000Z", "meal");

        assert_eq!(delete_log(&[a.clone(), b.clone()], &b.timestamp), vec![a.clone()]);
        // Unknown timestamp is a no-op
        assert_eq!(delete_log(&[a.clone()], "nonexistent"), vec![a]);
    }

    #[test]
    fn test_store_writes_through() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = LogStore::load(storage.clone()).unwrap();
        assert!(store.entries().is_empty());

        let a = entry("2024-01-01T09:00:00.000Z", "focus");
        let event = store.record(a.clone(), None).unwrap();
        assert_eq!(event.kind, TrackerEventKind::LogAdded);
        assert_eq!(event.resource, "tracker");

        let persisted: Vec<LogEntry> =
            serde_json::from_value(storage.get_item(TRACKER_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted, vec![a.clone()]);

        let edited = entry(&a.timestamp, "meal");
        let event = store.record(edited, Some(&a.timestamp)).unwrap();
        assert_eq!(event.kind, TrackerEventKind::LogUpdated);
        assert_eq!(event.payload.previous_timestamp.as_deref(), Some(a.timestamp.as_str()));
        assert_eq!(store.entries()[0].activity, "meal");

        let event = store.delete(&a.timestamp).unwrap();
        assert_eq!(event.kind, TrackerEventKind::LogDeleted);
        assert!(store.entries().is_empty());
        assert_eq!(storage.get_item(TRACKER_KEY).unwrap(), Some(serde_json::json!([])));
    }

    #[test]
    fn test_store_loads_existing_and_tolerates_garbage() {
        let storage = Arc::new(MemoryStorage::new());
        let a = entry("2024-01-01T09:00:00.000Z", "focus");
        storage
            .set_item(TRACKER_KEY, &serde_json::to_value(vec![a.clone()]).unwrap())
            .unwrap();
        let mut store = LogStore::load(storage.clone()).unwrap();
        assert_eq!(store.entries(), &[a.clone()]);
        assert_eq!(store.recent(5).len(), 1);

        store.replace_from_storage(Some(serde_json::json!({"not": "a list"})));
        assert!(store.entries().is_empty());
    }

    struct ReadOnlyStorage;

    impl Storage for ReadOnlyStorage {
        fn get_item(&self, _key: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        fn set_item(&self, key: &str, _value: &Value) -> Result<()> {
            Err(TrackerError::InvalidInput(format!("{key} is read-only")))
        }

        fn subscribe(&self, _key: &str, _setter: Setter) -> SubscriptionId {
            unimplemented!()
        }

        fn unsubscribe(&self, _id: SubscriptionId) {}
    }

    #[test]
    fn test_write_failure_surfaces_but_memory_is_updated() {
        // Known gap: memory and storage diverge after a failed write
        let mut store = LogStore::load(Arc::new(ReadOnlyStorage)).unwrap();
        let result = store.record(entry("2024-01-01T09:00:00.000Z", "focus"), None);
        assert!(result.is_err());
        assert_eq!(store.entries().len(), 1);
    }
}

/// Returns `logs` with `entry` prepended, or, when `editing` is set, with
/// the entry whose timestamp equals `editing` replaced in place.
pub fn append_or_update_log(logs: &[LogEntry], entry: LogEntry, editing: Option<&str>) -> Vec<LogEntry> {
    match editing {
        Some(timestamp) => logs
            .iter()
            .map(|log| {
                if log.timestamp == timestamp {
                    entry.clone()
                } else {
                    log.clone()
                }
            })
            .collect(),
        None => {
            let mut updated = Vec::with_capacity(logs.len() + 1);
            updated.push(entry);
            updated.extend_from_slice(logs);
            updated
        }
    }
}

/// Returns `logs` without the entry matching `timestamp`.
pub fn delete_log(logs: &[LogEntry], timestamp: &str) -> Vec<LogEntry> {
    logs.iter()
        .filter(|log| log.timestamp != timestamp)
        .cloned()
        .collect()
}

/// Tracker log, newest first, written through to storage on every change
pub struct LogStore {
    storage: Arc<dyn Storage>,
    logs: Vec<LogEntry>,
}

impl LogStore {
    pub fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let mut store = Self {
            storage,
            logs: Vec::new(),
        };
        let current = store.storage.get_item(TRACKER_KEY)?;
        store.replace_from_storage(current);
        Ok(store)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn recent(&self, limit: usize) -> &[LogEntry] {
        &self.logs[..limit.min(self.logs.len())]
    }

    pub fn find(&self, timestamp: &str) -> Option<&LogEntry> {
        self.logs.iter().find(|log| log.timestamp == timestamp)
    }

    /// Adopts the list last written to storage. Unreadable data empties the log.
    pub fn replace_from_storage(&mut self, value: Option<Value>) {
        self.logs = match value {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, key = TRACKER_KEY, "tracker_log_malformed");
                Vec::new()
            }),
        };
    }

    /// Adds `entry`, or replaces the entry timestamped `editing`.
    pub fn record(&mut self, entry: LogEntry, editing: Option<&str>) -> Result<TrackerEvent> {
        self.logs = append_or_update_log(&self.logs, entry.clone(), editing);

        let kind = if editing.is_some() {
            TrackerEventKind::LogUpdated
        } else {
            TrackerEventKind::LogAdded
        };
        info!(
            activity = %entry.activity,
            timing = %entry.timing,
            energy = entry.energy.get(),
            focus = entry.focus.get(),
            edited = editing.is_some(),
            "log_entry_recorded"
        );

        self.persist()?;
        Ok(TrackerEvent::new(
            kind,
            TRACKER_KEY,
            TrackerEventPayload {
                log: Some(entry),
                previous_timestamp: editing.map(str::to_string),
            },
        ))
    }

    pub fn delete(&mut self, timestamp: &str) -> Result<TrackerEvent> {
        let removed = self.find(timestamp).cloned();
        self.logs = delete_log(&self.logs, timestamp);
        info!(timestamp, found = removed.is_some(), "log_entry_deleted");

        self.persist()?;
        Ok(TrackerEvent::new(
            TrackerEventKind::LogDeleted,
            TRACKER_KEY,
            TrackerEventPayload {
                log: removed,
                previous_timestamp: Some(timestamp.to_string()),
            },
        ))
    }

    fn persist(&self) -> Result<()> {
        let value = serde_json::to_value(&self.logs)?;
        self.storage.set_item(TRACKER_KEY, &value).map_err(|e| {
            error!(error = %e, kind = e.label(), key = TRACKER_KEY, "tracker_log_write_failed");
            e
        })
    }
}
