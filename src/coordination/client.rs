//! Exchange Client
//!
//! Publishes messages into a server instance's request log and, for
//! request/response calls, polls the response store until the outcome
//! appears or the backoff budget runs out.

use super::types::{Audit, MessageEnvelope, audit_key, result_key};
use crate::backoff::BackoffStrategy;
use crate::error::{ExchangeError, FailureRegistry, StorageError};
use crate::fingerprint::fingerprint;
use crate::hosts::selector::HostSelector;
use crate::storage::contract::{PartitionedStorage, Storage, ready_content};
use crate::storage::record::{CachingResult, now_ms};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ExchangeClient {
    requests: Arc<dyn PartitionedStorage>,
    audits: Arc<dyn Storage>,
    results: Arc<dyn Storage>,
    hosts: Arc<HostSelector>,
    backoff: Arc<dyn BackoffStrategy>,
    failures: Arc<FailureRegistry>,
    user: String,
}

impl ExchangeClient {
    pub fn new(
        requests: Arc<dyn PartitionedStorage>,
        audits: Arc<dyn Storage>,
        results: Arc<dyn Storage>,
        hosts: Arc<HostSelector>,
        backoff: Arc<dyn BackoffStrategy>,
        failures: Arc<FailureRegistry>,
        user: &str,
    ) -> Arc<Self> {
        Arc::new(Self {
            requests,
            audits,
            results,
            hosts,
            backoff,
            failures,
            user: user.to_string(),
        })
    }

    /// Fire-and-forget publication. Returns the message's fingerprint; no
    /// response is awaited.
    pub async fn publish(
        &self,
        message_type: &str,
        payload: serde_json::Value,
    ) -> Result<String, ExchangeError> {
        self.append(message_type, payload, None).await
    }

    /// Request/response call: publish with an expiry covering the whole
    /// polling budget, then poll the response store by fingerprint.
    pub async fn request(
        &self,
        message_type: &str,
        payload: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, ExchangeError> {
        let expires = now_ms() + self.backoff.total_time().as_millis() as u64;
        let fingerprint = self
            .append(message_type, payload, Some(expires))
            .await?;

        let key = result_key(&fingerprint);
        let mut attempt = 1;

        while self.backoff.can_retry(attempt) {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExchangeError::Cancelled),
                _ = tokio::time::sleep(self.backoff.delay_time(attempt)) => {}
            }

            if let Some(record) = self.results.try_get(&key).await? {
                tracing::debug!(
                    "response for '{}' arrived after {} poll(s)",
                    fingerprint,
                    attempt
                );
                return CachingResult::from_bytes(&record.content)?.into_outcome(&self.failures);
            }

            attempt += 1;
        }

        Err(ExchangeError::Deferred { fingerprint })
    }

    async fn append(
        &self,
        message_type: &str,
        payload: serde_json::Value,
        expires: Option<u64>,
    ) -> Result<String, ExchangeError> {
        // The fingerprint is computed once here and never changes.
        let print = fingerprint(message_type, &payload);
        let instance = self.hosts.get_instance(message_type).await?;

        let audit = Audit::new(&self.user);
        let envelope = MessageEnvelope {
            message_type: message_type.to_string(),
            payload,
            fingerprint: print.clone(),
            audit: audit.clone(),
            expires,
        };

        let content = serde_json::to_vec(&envelope).map_err(StorageError::Codec)?;
        let index = self.requests.add(&instance, content).await?;

        // The paired audit record; the server does not process the entry
        // until both are visible.
        let audit_content = serde_json::to_vec(&audit).map_err(StorageError::Codec)?;
        self.audits
            .add_or_get(&audit_key(&instance, index), ready_content(audit_content))
            .await?;

        tracing::debug!(
            "published '{}' to instance '{}' at index {} (correlation {})",
            message_type,
            instance,
            index,
            audit.correlation_id
        );

        Ok(print)
    }
}
