//! Key-value storage with change notification.
//!
//! Values are JSON documents. Every successful `set_item` notifies the
//! setters subscribed to that key. Writes are last-write-wins; a single
//! writer is assumed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};

pub const SCHEDULE_KEY: &str = "schedule";
pub const TRACKER_KEY: &str = "tracker";
pub const TOC_KEY: &str = "toc";

/// Callback receiving the latest value of a key (`None` when unset)
pub type Setter = Arc<dyn Fn(Option<Value>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<Value>>;

    /// Persists `value` under `key`, then notifies subscribers of `key`.
    fn set_item(&self, key: &str, value: &Value) -> Result<()>;

    fn subscribe(&self, key: &str, setter: Setter) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Subscriber registry shared by the storage backends
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    by_key: Mutex<HashMap<String, Vec<(SubscriptionId, Setter)>>>,
}

impl Subscribers {
    pub fn add(&self, key: &str, setter: Setter) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.by_key)
            .entry(key.to_string())
            .or_default()
            .push((id, setter));
        id
    }

    pub fn remove(&self, id: SubscriptionId) {
        let mut by_key = lock(&self.by_key);
        for setters in by_key.values_mut() {
            setters.retain(|(existing, _)| *existing != id);
        }
        by_key.retain(|_, setters| !setters.is_empty());
    }

    pub fn count(&self, key: &str) -> usize {
        lock(&self.by_key).get(key).map(Vec::len).unwrap_or(0)
    }

    pub fn notify(&self, key: &str, value: &Value) {
        // Setters run outside the lock so they may touch storage themselves
        let setters: Vec<Setter> = lock(&self.by_key)
            .get(key)
            .map(|setters| setters.iter().map(|(_, s)| Arc::clone(s)).collect())
            .unwrap_or_default();

        debug!(key, subscribers = setters.len(), "storage_notify");
        for setter in setters {
            setter(Some(value.clone()));
        }
    }
}

/// In-process storage
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, Value>>,
    subscribers: Subscribers,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.count(key)
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let items = self
            .items
            .read()
            .map_err(|e| TrackerError::Lock(e.to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &Value) -> Result<()> {
        {
            let mut items = self
                .items
                .write()
                .map_err(|e| TrackerError::Lock(e.to_string()))?;
            items.insert(key.to_string(), value.clone());
        }
        self.subscribers.notify(key, value);
        Ok(())
    }

    fn subscribe(&self, key: &str, setter: Setter) -> SubscriptionId {
        self.subscribers.add(key, setter)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(id)
    }
}

/// SQLite-backed storage: one row per key, value stored as JSON text
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    subscribers: Subscribers,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            subscribers: Subscribers::default(),
        })
    }

    /// When `key` was last written.
    pub fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = lock(&self.conn);
        let at = conn
            .query_row(
                "SELECT updated_at FROM storage WHERE key = ?1",
                params![key],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()?;
        Ok(at)
    }
}

impl Storage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let raw = {
            let conn = lock(&self.conn);
            conn.query_row(
                "SELECT value FROM storage WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        };

        match raw {
            Some(text) => match serde_json::from_str(&text) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(key, error = %e, "storage_value_unreadable");
                    Err(e.into())
                }
            },
            None => Ok(None),
        }
    }

    fn set_item(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        {
            let conn = lock(&self.conn);
            conn.execute(
                "INSERT INTO storage (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, text, Utc::now()],
            )?;
        }
        self.subscribers.notify(key, value);
        Ok(())
    }

    fn subscribe(&self, key: &str, setter: Setter) -> SubscriptionId {
        self.subscribers.add(key, setter)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(id)
    }
}

/// Writes the JSON document at `path` under `key`.
pub fn seed_item(storage: &dyn Storage, key: &str, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    storage.set_item(key, &value)?;
    info!(key, path = %path.display(), "storage_seeded");
    Ok(())
}

/// Subscriptions made by [`sync_component`]. Released by `cleanup` or drop.
pub struct SyncHandle {
    storage: Arc<dyn Storage>,
    ids: Vec<SubscriptionId>,
}

impl SyncHandle {
    pub fn cleanup(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for id in self.ids.drain(..) {
            self.storage.unsubscribe(id);
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Subscribes each setter to its key and delivers the key's current value
/// once.
pub fn sync_component(storage: Arc<dyn Storage>, setters: Vec<(&str, Setter)>) -> Result<SyncHandle> {
    let mut handle = SyncHandle {
        storage: Arc::clone(&storage),
        ids: Vec::with_capacity(setters.len()),
    };

    for (key, setter) in setters {
        handle.ids.push(storage.subscribe(key, Arc::clone(&setter)));
        let current = storage.get_item(key)?;
        setter(current);
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn recording_setter() -> (Setter, Arc<Mutex<Vec<Option<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let setter: Setter = Arc::new(move |value: Option<Value>| sink.lock().unwrap().push(value));
        (setter, seen)
    }

    #[test]
    fn test_memory_storage_roundtrip_and_notify() {
        let storage = MemoryStorage::new();
        let (setter, seen) = recording_setter();
        storage.subscribe("tracker", setter);

        assert_eq!(storage.get_item("tracker").unwrap(), None);
        storage.set_item("tracker", &json!([1, 2])).unwrap();
        storage.set_item("schedule", &json!({})).unwrap();

        assert_eq!(storage.get_item("tracker").unwrap(), Some(json!([1, 2])));
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!([1, 2]))]);
    }

    #[test]
    fn test_sync_component_delivers_then_cleans_up() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("schedule", &json!({"schedules": []})).unwrap();

        let (schedule_setter, schedules) = recording_setter();
        let (tracker_setter, trackers) = recording_setter();
        let handle = sync_component(
            storage.clone(),
            vec![("schedule", schedule_setter), ("tracker", tracker_setter)],
        )
        .unwrap();

        // Initial delivery, including the unset key
        assert_eq!(*schedules.lock().unwrap(), vec![Some(json!({"schedules": []}))]);
        assert_eq!(*trackers.lock().unwrap(), vec![None]);
        assert_eq!(storage.subscriber_count("tracker"), 1);

        storage.set_item("tracker", &json!([])).unwrap();
        assert_eq!(trackers.lock().unwrap().len(), 2);

        handle.cleanup();
        assert_eq!(storage.subscriber_count("tracker"), 0);
        storage.set_item("tracker", &json!(["ignored"])).unwrap();
        assert_eq!(trackers.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_sync_handle_drop_unsubscribes() {
        let storage = Arc::new(MemoryStorage::new());
        let (setter, _) = recording_setter();
        {
            let _handle = sync_component(storage.clone(), vec![("toc", setter)]).unwrap();
            assert_eq!(storage.subscriber_count("toc"), 1);
        }
        assert_eq!(storage.subscriber_count("toc"), 0);
    }

    #[test]
    fn test_sqlite_storage_persists_across_connections() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.set_item("tracker", &json!([{"activity": "focus"}])).unwrap();
            // Last write wins
            storage.set_item("tracker", &json!([{"activity": "meal"}])).unwrap();
            assert!(storage.updated_at("tracker").unwrap().is_some());
        }

        let reopened = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get_item("tracker").unwrap(),
            Some(json!([{"activity": "meal"}]))
        );
        assert_eq!(reopened.get_item("schedule").unwrap(), None);
        assert_eq!(reopened.updated_at("schedule").unwrap(), None);
    }

    #[test]
    fn test_sqlite_storage_notifies_subscribers() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let (setter, seen) = recording_setter();
        let id = storage.subscribe("schedule", setter);

        storage.set_item("schedule", &json!({"schedules": []})).unwrap();
        storage.unsubscribe(id);
        storage.set_item("schedule", &json!({})).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_seed_item_from_file() {
        let mut seed = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut seed, br#"{"schedules": [{"name": "Base"}]}"#).unwrap();

        let storage = MemoryStorage::new();
        seed_item(&storage, SCHEDULE_KEY, seed.path()).unwrap();
        assert_eq!(
            storage.get_item(SCHEDULE_KEY).unwrap(),
            Some(json!({"schedules": [{"name": "Base"}]}))
        );

        let missing = std::path::PathBuf::from("/nonexistent/schedule.json");
        assert!(matches!(
            seed_item(&storage, SCHEDULE_KEY, &missing),
            Err(TrackerError::Io(_))
        ));
    }
}
