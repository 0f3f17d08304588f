//! Exchange Server
//!
//! One sequential processing loop per configured instance. The loop owns the
//! instance's persisted cursor: it reads the request log strictly in order,
//! dispatches each entry through the interceptor pipeline (which commits the
//! outcome idempotently), and only then advances the cursor. Re-reading an
//! index after a crash is safe because only the first response commit is
//! durable.

use super::registry::HandlerRegistry;
use super::types::{Audit, MessageEnvelope, audit_key, cursor_key};
use crate::config::NodeConfig;
use crate::error::{ExchangeError, FailureRegistry, StorageError};
use crate::hosts::registry::HostRegistry;
use crate::hosts::types::HostRegistration;
use crate::pipeline::caching::CachingInterceptor;
use crate::pipeline::classify::ClassifyInterceptor;
use crate::pipeline::diagnostics::DiagnosticsInterceptor;
use crate::pipeline::retry::RetryInterceptor;
use crate::pipeline::timeout::TimeoutInterceptor;
use crate::pipeline::{Pipeline, Terminal};
use crate::storage::contract::{PartitionedStorage, Storage, UpdateFactory, ready_content};
use crate::storage::record::now_ms;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

enum Polled {
    Entry(Box<(MessageEnvelope, Audit)>),
    Corrupt,
    Shutdown,
}

pub struct ExchangeServer {
    config: NodeConfig,
    requests: Arc<dyn PartitionedStorage>,
    audits: Arc<dyn Storage>,
    cursors: Arc<dyn Storage>,
    hosts: Arc<HostRegistry>,
    pipeline: Pipeline,
    shutdown: CancellationToken,
}

impl ExchangeServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: NodeConfig,
        requests: Arc<dyn PartitionedStorage>,
        audits: Arc<dyn Storage>,
        results: Arc<dyn Storage>,
        cursors: Arc<dyn Storage>,
        hosts: Arc<HostRegistry>,
        handlers: Arc<HandlerRegistry>,
        failures: Arc<FailureRegistry>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let terminal_handlers = handlers;
        let terminal_cancel = shutdown.clone();
        let terminal: Terminal = Arc::new(move |envelope| {
            let handlers = terminal_handlers.clone();
            let cancel = terminal_cancel.clone();
            Box::pin(async move { handlers.execute(envelope, cancel).await })
        });

        let pipeline = Pipeline::builder()
            .with(Arc::new(DiagnosticsInterceptor))
            .with(Arc::new(ClassifyInterceptor))
            .with(Arc::new(TimeoutInterceptor::new(config.handler_timeout())))
            .with(Arc::new(CachingInterceptor::new(results, failures)))
            .with(Arc::new(RetryInterceptor::new(
                config.handler_backoff.build(),
            )))
            .build(terminal);

        Arc::new(Self {
            config,
            requests,
            audits,
            cursors,
            hosts,
            pipeline,
            shutdown,
        })
    }

    /// Runs the processing loop until the shutdown token fires.
    pub async fn run(self: Arc<Self>) -> Result<(), ExchangeError> {
        self.register_now().await?;
        self.spawn_registration_heartbeat();

        let mut index = self.load_cursor().await? + 1;
        tracing::info!(
            "instance '{}' processing from index {}",
            self.config.instance,
            index
        );

        loop {
            let (envelope, audit) = match self.poll_entry(index).await {
                Polled::Entry(pair) => *pair,
                Polled::Corrupt => {
                    // A poisoned entry would otherwise wedge the log.
                    self.persist_cursor(index).await?;
                    index += 1;
                    continue;
                }
                Polled::Shutdown => break,
            };

            // Restore caller context from the paired audit record: the
            // stored audit is authoritative over the envelope's copy.
            let mut envelope = envelope;
            envelope.audit = audit;

            let outcome = self.pipeline.dispatch(envelope).await;
            match &outcome {
                Ok(_) => tracing::debug!("index {} processed and committed", index),
                Err(ExchangeError::Cancelled) => {
                    // Shutdown surfaced mid-handling; the index was not
                    // durably resolved, so resume here next run.
                    tracing::info!("shutdown while handling index {}", index);
                    break;
                }
                Err(error) if error.is_transient() => {
                    tracing::warn!("index {} has no outcome yet: {}", index, error);
                }
                Err(error) => {
                    tracing::debug!("index {} committed a failure: {}", index, error);
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            self.persist_cursor(index).await?;
            index += 1;

            if !self.sleep_or_shutdown(self.config.next_message_delay()).await {
                break;
            }
        }

        tracing::info!("processing loop for '{}' stopped", self.config.instance);
        Ok(())
    }

    /// Waits until both the request entry and its paired audit record are
    /// visible at `index`, sleeping `inactivity_delay` in between.
    async fn poll_entry(&self, index: i64) -> Polled {
        loop {
            if self.shutdown.is_cancelled() {
                return Polled::Shutdown;
            }

            let entry = self.requests.try_get(&self.config.instance, index).await;
            let audit = self
                .audits
                .try_get(&audit_key(&self.config.instance, index))
                .await;

            match (entry, audit) {
                (Ok(Some(entry)), Ok(Some(audit))) => {
                    let envelope = serde_json::from_slice::<MessageEnvelope>(&entry.content);
                    let audit = serde_json::from_slice::<Audit>(&audit.content);
                    match (envelope, audit) {
                        (Ok(envelope), Ok(audit)) => {
                            return Polled::Entry(Box::new((envelope, audit)));
                        }
                        (envelope, audit) => {
                            tracing::error!(
                                "skipping undecodable entry at index {}: {:?} / {:?}",
                                index,
                                envelope.err(),
                                audit.err()
                            );
                            return Polled::Corrupt;
                        }
                    }
                }
                (Ok(_), Ok(_)) => {
                    // Nothing (or only half the pair) yet; do not advance.
                }
                (entry, audit) => {
                    tracing::warn!(
                        "polling index {} failed: {:?} / {:?}",
                        index,
                        entry.err(),
                        audit.err()
                    );
                }
            }

            if !self.sleep_or_shutdown(self.config.inactivity_delay()).await {
                return Polled::Shutdown;
            }
        }
    }

    async fn load_cursor(&self) -> Result<i64, ExchangeError> {
        let record = self
            .cursors
            .try_get(&cursor_key(&self.config.instance))
            .await?;

        match record {
            Some(record) => Ok(serde_json::from_slice::<i64>(&record.content)
                .map_err(StorageError::Codec)?),
            None => Ok(0),
        }
    }

    async fn persist_cursor(&self, index: i64) -> Result<(), ExchangeError> {
        let content = serde_json::to_vec(&index).map_err(StorageError::Codec)?;

        let update_content = content.clone();
        let update: UpdateFactory = Box::new(move |_current| {
            let content = update_content.clone();
            Box::pin(async move { Ok(content) })
        });

        self.cursors
            .add_or_update(
                &cursor_key(&self.config.instance),
                ready_content(content),
                update,
            )
            .await?;
        Ok(())
    }

    async fn register_now(&self) -> Result<(), ExchangeError> {
        let registration = HostRegistration {
            instance: self.config.instance.clone(),
            accepted_message_types: self
                .config
                .accepted_message_types
                .iter()
                .cloned()
                .collect(),
            accept_others: self.config.accept_others,
            expired: now_ms() + self.config.registration_ttl_ms,
        };

        self.hosts.register(registration).await
    }

    fn spawn_registration_heartbeat(self: &Arc<Self>) {
        let server = self.clone();

        tokio::spawn(async move {
            let period = (server.config.registration_ttl() / 2).max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = server.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(error) = server.register_now().await {
                            tracing::warn!("registration refresh failed: {}", error);
                        }
                    }
                }
            }
        });
    }

    /// Returns false when shutdown fired during the wait.
    async fn sleep_or_shutdown(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
