//! Reminder store — at most one adopted plant per id, persisted under a single
//! key as a JSON object keyed by plant id.
//!
//! Mutations are read-modify-write cycles over that one value, so `save`,
//! `remove` and `clear` are serialised behind a single writer lock. Without it,
//! two saves for different plants could both read the old mapping and one of
//! them would be lost on write-back.
//!
//! The store never talks to the notification scheduler. Callers arm or cancel
//! the reminder right after a successful `save` or `remove`.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::plant::{CatalogEntry, PlantId, StoredPlant};
use crate::reminders::clock::Clock;
use crate::storage::{KeyValueStore, StorageError};

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Reminder time {requested} is not in the future (now: {now})")]
    InvalidReminderTime {
        requested: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

type PlantMap = BTreeMap<PlantId, StoredPlant>;

pub struct ReminderStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    clock: Arc<dyn Clock>,
    writer: Mutex<()>,
}

impl ReminderStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            key: key.into(),
            clock,
            writer: Mutex::new(()),
        }
    }

    /// Adopts `entry` with a reminder at `reminder_at`, replacing any record
    /// with the same id. Rejects times that are not strictly after now.
    pub async fn save(
        &self,
        entry: CatalogEntry,
        reminder_at: DateTime<Utc>,
    ) -> Result<StoredPlant, ReminderError> {
        let now = self.clock.now();
        if reminder_at <= now {
            return Err(ReminderError::InvalidReminderTime {
                requested: reminder_at,
                now,
            });
        }

        let stored = StoredPlant { entry, reminder_at };

        let _writer = self.writer.lock().await;
        let mut plants = self.read_map().await?;
        let replaced = plants.insert(stored.id().clone(), stored.clone()).is_some();
        self.write_map(&plants).await?;

        info!(
            "Saved plant {} ({}) with reminder at {}{}",
            stored.id(),
            stored.entry.name,
            stored.reminder_at,
            if replaced { ", replacing previous" } else { "" }
        );
        Ok(stored)
    }

    /// Every stored plant, soonest reminder first; ties ordered by id.
    pub async fn load_all(&self) -> Result<Vec<StoredPlant>, ReminderError> {
        let mut plants: Vec<StoredPlant> = self.read_map().await?.into_values().collect();
        plants.sort_by(|a, b| {
            a.reminder_at
                .cmp(&b.reminder_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(plants)
    }

    pub async fn next_due(&self) -> Result<Option<StoredPlant>, ReminderError> {
        Ok(self.load_all().await?.into_iter().next())
    }

    /// Deletes the record for `id`. Returns whether one existed; absent ids are not an error.
    pub async fn remove(&self, id: &PlantId) -> Result<bool, ReminderError> {
        let _writer = self.writer.lock().await;
        let mut plants = self.read_map().await?;
        if plants.remove(id).is_none() {
            debug!("Remove of unknown plant {} ignored", id);
            return Ok(false);
        }
        self.write_map(&plants).await?;

        info!("Removed plant {}", id);
        Ok(true)
    }

    /// Purges every record.
    pub async fn clear(&self) -> Result<(), ReminderError> {
        let _writer = self.writer.lock().await;
        self.kv.delete(&self.key).await?;
        info!("Cleared all stored plants");
        Ok(())
    }

    async fn read_map(&self) -> Result<PlantMap, StorageError> {
        match self.kv.get(&self.key).await? {
            Some(raw) => serde_json::from_slice(&raw).map_err(StorageError::Corrupt),
            None => Ok(PlantMap::new()),
        }
    }

    async fn write_map(&self, plants: &PlantMap) -> Result<(), StorageError> {
        let raw = serde_json::to_vec(plants).map_err(StorageError::Encode)?;
        self.kv.set(&self.key, Bytes::from(raw)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::task::JoinSet;

    use super::*;
    use crate::models::plant::sample_entry;
    use crate::reminders::clock::ManualClock;
    use crate::storage::MemoryStore;

    const KEY: &str = "@plantmanager:plants";
    const NOW: &str = "2030-05-01T09:00:00Z";

    /// Yields between reads and writes so unsynchronised read-modify-write
    /// cycles would interleave. Writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
            let value = self.inner.get(key).await;
            tokio::task::yield_now().await;
            value
        }

        async fn set(&self, key: &str, value: Bytes) -> Result<(), StorageError> {
            tokio::task::yield_now().await;
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    fn store_with(kv: Arc<dyn KeyValueStore>) -> (ReminderStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(NOW));
        (ReminderStore::new(kv, KEY, clock.clone()), clock)
    }

    fn store() -> (ReminderStore, Arc<ManualClock>) {
        store_with(Arc::new(MemoryStore::new()))
    }

    fn at(offset_secs: i64) -> DateTime<Utc> {
        NOW.parse::<DateTime<Utc>>().unwrap() + Duration::seconds(offset_secs)
    }

    fn ids(plants: &[StoredPlant]) -> Vec<&str> {
        plants.iter().map(|p| p.id().as_str()).collect()
    }

    #[tokio::test]
    async fn test_load_all_in_due_order() {
        let (store, _) = store();
        store
            .save(sample_entry("p1", "Fern", &["bathroom"]), at(3600))
            .await
            .unwrap();
        store
            .save(sample_entry("p2", "Cactus", &["kitchen"]), at(60))
            .await
            .unwrap();

        let plants = store.load_all().await.unwrap();
        assert_eq!(ids(&plants), vec!["p2", "p1"]);
        assert_eq!(store.next_due().await.unwrap().unwrap().id().as_str(), "p2");
    }

    #[tokio::test]
    async fn test_equal_times_ordered_by_id() {
        let (store, _) = store();
        for id in ["c", "a", "b"] {
            store.save(sample_entry(id, id, &[]), at(600)).await.unwrap();
        }
        store.save(sample_entry("z", "z", &[]), at(300)).await.unwrap();

        assert_eq!(ids(&store.load_all().await.unwrap()), vec!["z", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_resave_replaces_record() {
        let (store, _) = store();
        store
            .save(sample_entry("p1", "Fern", &[]), at(3600))
            .await
            .unwrap();
        let stored = store
            .save(sample_entry("p1", "Fern", &[]), at(120))
            .await
            .unwrap();
        assert_eq!(stored.reminder_at, at(120));

        let plants = store.load_all().await.unwrap();
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].reminder_at, at(120));
    }

    #[tokio::test]
    async fn test_rejects_time_not_in_future() {
        let (store, clock) = store();
        store
            .save(sample_entry("p1", "Fern", &[]), at(60))
            .await
            .unwrap();
        let before = store.load_all().await.unwrap();

        for offset in [0, -1, -86_400] {
            let err = store
                .save(sample_entry("p2", "Cactus", &[]), at(offset))
                .await
                .unwrap_err();
            assert!(matches!(err, ReminderError::InvalidReminderTime { .. }));
        }

        // A time that was valid becomes invalid once the clock passes it.
        clock.advance(Duration::seconds(120));
        let err = store
            .save(sample_entry("p1", "Fern", &[]), at(90))
            .await
            .unwrap_err();
        assert!(matches!(err, ReminderError::InvalidReminderTime { .. }));

        assert_eq!(store.load_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (store, _) = store();
        store
            .save(sample_entry("p1", "Fern", &[]), at(60))
            .await
            .unwrap();
        store
            .save(sample_entry("p2", "Cactus", &[]), at(120))
            .await
            .unwrap();

        assert!(store.remove(&PlantId::new("p1")).await.unwrap());
        assert!(!store.remove(&PlantId::new("p1")).await.unwrap());
        assert!(!store.remove(&PlantId::new("never-saved")).await.unwrap());

        assert_eq!(ids(&store.load_all().await.unwrap()), vec!["p2"]);
    }

    #[tokio::test]
    async fn test_empty_store_loads_empty() {
        let (store, _) = store();
        assert!(store.load_all().await.unwrap().is_empty());
        assert!(store.next_due().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_purges_everything() {
        let (store, _) = store();
        store
            .save(sample_entry("p1", "Fern", &[]), at(60))
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_keep_every_plant() {
        let (store, _) = store_with(Arc::new(FlakyStore::default()));
        let store = Arc::new(store);

        let mut tasks = JoinSet::new();
        for i in 0..25 {
            let store = store.clone();
            tasks.spawn(async move {
                let id = format!("plant-{i:02}");
                store
                    .save(sample_entry(&id, &id, &[]), at(60 + i))
                    .await
                    .unwrap();
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let plants = store.load_all().await.unwrap();
        assert_eq!(plants.len(), 25);
        assert_eq!(plants[0].id().as_str(), "plant-00");
        assert_eq!(plants[24].id().as_str(), "plant-24");
    }

    #[tokio::test]
    async fn test_failed_write_reports_storage_error() {
        let kv = Arc::new(FlakyStore::default());
        let (store, _) = store_with(kv.clone());
        store
            .save(sample_entry("p1", "Fern", &[]), at(60))
            .await
            .unwrap();

        kv.fail_writes.store(true, Ordering::SeqCst);
        let err = store
            .save(sample_entry("p2", "Cactus", &[]), at(90))
            .await
            .unwrap_err();
        assert!(matches!(err, ReminderError::Storage(StorageError::Io(_))));
        let err = store.remove(&PlantId::new("p1")).await.unwrap_err();
        assert!(matches!(err, ReminderError::Storage(_)));

        assert_eq!(ids(&store.load_all().await.unwrap()), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_corrupt_mapping_is_storage_error() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(KEY, Bytes::from_static(b"not json")).await.unwrap();
        let (store, _) = store_with(kv);

        let err = store.load_all().await.unwrap_err();
        assert!(matches!(
            err,
            ReminderError::Storage(StorageError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_persisted_mapping_keyed_by_id() {
        let kv = Arc::new(MemoryStore::new());
        let (store, _) = store_with(kv.clone());
        store
            .save(sample_entry("p1", "Fern", &["bathroom"]), at(60))
            .await
            .unwrap();

        let raw = kv.get(KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["p1"]["name"], "Fern");
        assert_eq!(value["p1"]["dateTimeNotification"], "2030-05-01T09:01:00Z");
    }
}
