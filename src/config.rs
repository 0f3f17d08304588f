//! Node Configuration
//!
//! Startup-bound settings for a server instance and the shared retry
//! policies. Bound once at startup; none of it is consulted by the hot path
//! beyond the values captured here.

use crate::backoff::{BackoffStrategy, ConstantBackoff, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Retry policy parameters. A `factor` of 1 yields constant backoff;
/// anything larger yields exponential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub interval_ms: u64,
    pub factor: u32,
    pub max_attempts: u32,
}

impl BackoffConfig {
    pub fn build(&self) -> Arc<dyn BackoffStrategy> {
        let interval = Duration::from_millis(self.interval_ms);
        if self.factor <= 1 {
            Arc::new(ConstantBackoff::new(interval, self.max_attempts))
        } else {
            Arc::new(ExponentialBackoff::new(
                interval,
                self.factor,
                self.max_attempts,
            ))
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            factor: 1,
            max_attempts: 10,
        }
    }
}

/// Settings for one server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Instance id; names this server's request-log partition.
    pub instance: String,
    /// Sleep while the next log entry (or its audit record) is absent.
    pub inactivity_delay_ms: u64,
    /// Sleep between successfully processed messages.
    pub next_message_delay_ms: u64,
    /// Deadline for one handler invocation.
    pub handler_timeout_ms: u64,
    /// Lifetime of a published host registration.
    pub registration_ttl_ms: u64,
    /// Message types this instance accepts explicitly.
    pub accepted_message_types: Vec<String>,
    /// Whether this instance also takes messages nobody claims.
    pub accept_others: bool,
    /// Retry policy for the pipeline's retry stage.
    pub handler_backoff: BackoffConfig,
}

impl NodeConfig {
    pub fn new(instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
            ..Self::default()
        }
    }

    pub fn inactivity_delay(&self) -> Duration {
        Duration::from_millis(self.inactivity_delay_ms)
    }

    pub fn next_message_delay(&self) -> Duration {
        Duration::from_millis(self.next_message_delay_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn registration_ttl(&self) -> Duration {
        Duration::from_millis(self.registration_ttl_ms)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            instance: "default".to_string(),
            inactivity_delay_ms: 100,
            next_message_delay_ms: 10,
            handler_timeout_ms: 30_000,
            registration_ttl_ms: 60_000,
            accepted_message_types: Vec::new(),
            accept_others: true,
            handler_backoff: BackoffConfig::default(),
        }
    }
}
