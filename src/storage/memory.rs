//! In-Memory Storage Provider
//!
//! Reference implementation of the storage contract, backed by `DashMap`.
//! Each key holds its full version history (ascending); a per-key async lock
//! serializes writers, which is what gives `add_or_get` its single-winner
//! collapse and `add_or_update` its conditional-write check.
//!
//! The same structure drives the partitioned provider: the append lock makes
//! index assignment atomic, so concurrent appends to one key always form a
//! dense, strictly increasing sequence.

use super::contract::{
    AddFactory, AdminStorage, HistoricalStorage, PartitionedStorage, Storage, UpdateFactory,
};
use super::record::{PARTITION_ORIGIN, StoreKey, ValueRecord, now_ms};
use crate::error::StorageError;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_WRITE_ATTEMPTS: u32 = 10;

/// In-memory versioned key-value store.
pub struct MemoryStorage {
    data: DashMap<StoreKey, Vec<ValueRecord>>,
    write_locks: DashMap<StoreKey, Arc<Mutex<()>>>,
    max_write_attempts: u32,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: DashMap::new(),
            write_locks: DashMap::new(),
            max_write_attempts: DEFAULT_WRITE_ATTEMPTS,
        })
    }

    /// Overrides the optimistic-concurrency retry budget. Used by tests to
    /// surface `ConcurrencyExceeded` deterministically.
    pub fn with_write_attempts(max_write_attempts: u32) -> Arc<Self> {
        Arc::new(Self {
            data: DashMap::new(),
            write_locks: DashMap::new(),
            max_write_attempts,
        })
    }

    fn latest(&self, key: &StoreKey) -> Option<ValueRecord> {
        self.data
            .get(key)
            .and_then(|versions| versions.last().cloned())
    }

    fn lock_for(&self, key: &StoreKey) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn add_or_get(
        &self,
        key: &StoreKey,
        add: AddFactory,
    ) -> Result<ValueRecord, StorageError> {
        if let Some(existing) = self.latest(key) {
            return Ok(existing);
        }

        // The factory runs inside the per-key critical section, so racing
        // callers wait here and then observe the winner's record instead of
        // running their own factory.
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        if let Some(existing) = self.latest(key) {
            return Ok(existing);
        }

        let content = add().await?;
        let record = ValueRecord::new(content, 1);
        self.data.insert(key.clone(), vec![record.clone()]);

        tracing::trace!("stored initial version for {}", key);
        Ok(record)
    }

    async fn add_or_update(
        &self,
        key: &StoreKey,
        add: AddFactory,
        update: UpdateFactory,
    ) -> Result<ValueRecord, StorageError> {
        let mut add = Some(add);

        for attempt in 1..=self.max_write_attempts {
            match self.latest(key) {
                None => {
                    let lock = self.lock_for(key);
                    let _guard = lock.lock().await;

                    if self.latest(key).is_some() {
                        // Lost the insert race; re-enter as an update.
                        continue;
                    }

                    let Some(add) = add.take() else {
                        continue;
                    };
                    let content = add().await?;
                    let record = ValueRecord::new(content, 1);
                    self.data.insert(key.clone(), vec![record.clone()]);
                    return Ok(record);
                }
                Some(current) => {
                    // Read-modify-write: compute outside the critical
                    // section, then commit only if the version is unchanged.
                    let content = update(current.clone()).await?;

                    let lock = self.lock_for(key);
                    let _guard = lock.lock().await;

                    let unchanged = self
                        .latest(key)
                        .map(|latest| latest.version == current.version)
                        .unwrap_or(false);

                    if !unchanged {
                        tracing::debug!(
                            "version conflict on {} (attempt {}/{})",
                            key,
                            attempt,
                            self.max_write_attempts
                        );
                        continue;
                    }

                    let record = ValueRecord {
                        content,
                        version: current.version + 1,
                        created: current.created,
                        updated: now_ms(),
                    };
                    self.data
                        .entry(key.clone())
                        .or_default()
                        .push(record.clone());
                    return Ok(record);
                }
            }
        }

        Err(StorageError::ConcurrencyExceeded {
            key: key.to_string(),
            attempts: self.max_write_attempts,
        })
    }

    async fn try_get(&self, key: &StoreKey) -> Result<Option<ValueRecord>, StorageError> {
        Ok(self.latest(key))
    }

    async fn try_remove(&self, key: &StoreKey) -> Result<Option<ValueRecord>, StorageError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        Ok(self
            .data
            .remove(key)
            .and_then(|(_, versions)| versions.into_iter().last()))
    }
}

#[async_trait]
impl HistoricalStorage for MemoryStorage {
    async fn try_get_version(
        &self,
        key: &StoreKey,
        version: i64,
    ) -> Result<Option<ValueRecord>, StorageError> {
        Ok(self.data.get(key).and_then(|versions| {
            versions
                .iter()
                .find(|record| record.version == version)
                .cloned()
        }))
    }

    async fn try_remove_up_to(
        &self,
        key: &StoreKey,
        up_to_version: i64,
    ) -> Result<usize, StorageError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut removed = 0;
        let mut now_empty = false;
        if let Some(mut entry) = self.data.get_mut(key) {
            let before = entry.len();
            entry.retain(|record| record.version > up_to_version);
            removed = before - entry.len();
            now_empty = entry.is_empty();
        }

        // Fully compacted keys disappear from enumeration.
        if now_empty {
            self.data.remove(key);
        }

        Ok(removed)
    }
}

#[async_trait]
impl AdminStorage for MemoryStorage {
    async fn get_keys(&self) -> Result<Vec<StoreKey>, StorageError> {
        Ok(self.data.iter().map(|entry| entry.key().clone()).collect())
    }
}

/// In-memory append-only partition log.
pub struct MemoryPartitionStorage {
    partitions: DashMap<String, Vec<ValueRecord>>,
    append_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryPartitionStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            partitions: DashMap::new(),
            append_locks: DashMap::new(),
        })
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.append_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl PartitionedStorage for MemoryPartitionStorage {
    async fn add(&self, key: &str, content: Vec<u8>) -> Result<i64, StorageError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut entry = self.partitions.entry(key.to_string()).or_default();
        let index = PARTITION_ORIGIN + entry.len() as i64;
        entry.push(ValueRecord::new(content, index));

        tracing::trace!("appended index {} to partition '{}'", index, key);
        Ok(index)
    }

    async fn try_get(&self, key: &str, index: i64) -> Result<Option<ValueRecord>, StorageError> {
        let offset = index - PARTITION_ORIGIN;
        if offset < 0 {
            return Ok(None);
        }

        Ok(self
            .partitions
            .get(key)
            .and_then(|entries| entries.get(offset as usize).cloned()))
    }

    async fn get_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .partitions
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect())
    }
}
