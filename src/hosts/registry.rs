use super::selector::hosts_key;
use super::types::{HostRegistration, HostsAvailability};
use crate::error::ExchangeError;
use crate::storage::contract::{AddFactory, Storage, UpdateFactory};
use std::sync::Arc;

/// Server-side writer of the registration table.
///
/// Each server publishes a TTL'd registration on startup and refreshes it on
/// a heartbeat; the table lives as a single record and is updated under the
/// store's optimistic concurrency, so concurrently registering instances
/// never clobber each other.
pub struct HostRegistry {
    store: Arc<dyn Storage>,
}

impl HostRegistry {
    pub fn new(store: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    /// Inserts or replaces this instance's registration in the table.
    pub async fn register(&self, registration: HostRegistration) -> Result<(), ExchangeError> {
        let instance = registration.instance.clone();

        let add_registration = registration.clone();
        let add: AddFactory = Box::new(move || {
            Box::pin(async move {
                let table = HostsAvailability {
                    registered: vec![add_registration],
                };
                Ok(serde_json::to_vec(&table)?)
            })
        });

        let update: UpdateFactory = Box::new(move |current| {
            let registration = registration.clone();
            Box::pin(async move {
                let mut table: HostsAvailability = serde_json::from_slice(&current.content)?;
                table
                    .registered
                    .retain(|existing| existing.instance != registration.instance);
                table.registered.push(registration);
                Ok(serde_json::to_vec(&table)?)
            })
        });

        self.store.add_or_update(&hosts_key(), add, update).await?;

        tracing::debug!("registration for instance '{}' published", instance);
        Ok(())
    }
}
