use super::types::{HOSTS_KEY_ID, HOSTS_VALUE_TYPE, HostRegistration, HostsAvailability};
use crate::error::ExchangeError;
use crate::storage::contract::Storage;
use crate::storage::record::{StoreKey, now_ms};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

pub fn hosts_key() -> StoreKey {
    StoreKey::new(HOSTS_KEY_ID, HOSTS_VALUE_TYPE)
}

/// Chooses which server instance a message is routed to.
///
/// Keeps a process-local, eventually-consistent copy of the registration
/// table and round-robins over the matching instances. A stale chosen match
/// (or no match at all) forces one refresh from the backing store before
/// giving up with `NotRegistered`.
pub struct HostSelector {
    store: Arc<dyn Storage>,
    cache: RwLock<Option<HostsAvailability>>,
    cursor: AtomicUsize,
}

impl HostSelector {
    pub fn new(store: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache: RwLock::new(None),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Resolves the target instance for a message type.
    pub async fn get_instance(&self, message_type: &str) -> Result<String, ExchangeError> {
        if self.cache.read().await.is_none() {
            self.refresh().await?;
        }

        if let Some(instance) = self.pick(message_type, now_ms()).await {
            return Ok(instance);
        }

        // Chosen match expired, or nothing matched: refresh once and retry.
        self.refresh().await?;

        match self.pick(message_type, now_ms()).await {
            Some(instance) => Ok(instance),
            None => Err(ExchangeError::NotRegistered {
                message_type: message_type.to_string(),
            }),
        }
    }

    async fn pick(&self, message_type: &str, now: u64) -> Option<String> {
        let cache = self.cache.read().await;
        let table = cache.as_ref()?;

        let explicit: Vec<&HostRegistration> = table
            .registered
            .iter()
            .filter(|registration| registration.accepts(message_type))
            .collect();

        let matches: Vec<&HostRegistration> = if explicit.is_empty() {
            table
                .registered
                .iter()
                .filter(|registration| registration.accept_others)
                .collect()
        } else {
            explicit
        };

        if matches.is_empty() {
            return None;
        }

        let chosen = if matches.len() == 1 {
            matches[0]
        } else {
            matches[self.cursor.fetch_add(1, Ordering::Relaxed) % matches.len()]
        };

        if chosen.is_expired(now) {
            tracing::debug!(
                "chosen registration '{}' for '{}' is stale",
                chosen.instance,
                message_type
            );
            return None;
        }

        Some(chosen.instance.clone())
    }

    /// Reloads the registration table from the backing store. Registrations
    /// found already expired are logged but kept; removal belongs to the
    /// store-side compaction concern, not the client.
    pub async fn refresh(&self) -> Result<(), ExchangeError> {
        let table = match self.store.try_get(&hosts_key()).await? {
            Some(record) => serde_json::from_slice::<HostsAvailability>(&record.content)
                .map_err(crate::error::StorageError::Codec)?,
            None => HostsAvailability::default(),
        };

        let now = now_ms();
        for registration in &table.registered {
            if registration.is_expired(now) {
                tracing::warn!(
                    "registration for instance '{}' expired at {}",
                    registration.instance,
                    registration.expired
                );
            }
        }

        tracing::debug!("host table refreshed ({} registrations)", table.registered.len());
        *self.cache.write().await = Some(table);
        Ok(())
    }
}
