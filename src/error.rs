//! Error Taxonomy and Failure Surrogates
//!
//! Defines the two error families of the exchange:
//! - **`StorageError`**: failures raised by storage providers (write contention,
//!   codec problems, aborted value factories).
//! - **`ExchangeError`**: everything a client or handler can observe, including
//!   the transient conditions (`Deferred`, `Timeout`, `Cancelled`) that the
//!   protocol never commits to the response store.
//!
//! Errors that cross process boundaries travel as a [`FailureModel`], a
//! serialization-safe surrogate, and are rebuilt on the other side through a
//! [`FailureRegistry`] of known kinds. Unknown kinds degrade to a generic
//! domain error carrying the original kind name and message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by storage providers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The optimistic-concurrency retry budget was exhausted for a key.
    #[error("write contention on '{key}' exhausted {attempts} attempts")]
    ConcurrencyExceeded { key: String, attempts: u32 },

    /// A value factory declined to produce a value. Nothing was stored.
    #[error("value factory aborted without producing a value")]
    Aborted,

    /// Stored content could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Everything a client, handler, or the server loop can observe.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// No host accepts the message type, or no handler is registered for it.
    #[error("no host or handler registered for message type '{message_type}'")]
    NotRegistered { message_type: String },

    /// No response appeared within the polling budget. Transient: the server
    /// may still produce one later.
    #[error("no response for request '{fingerprint}' within the polling budget")]
    Deferred { fingerprint: String },

    /// The handler invocation exceeded its deadline. Transient.
    #[error("message handling exceeded the {0:?} deadline")]
    Timeout(Duration),

    /// The caller's or server's cancellation token fired. Transient.
    #[error("operation cancelled")]
    Cancelled,

    /// Generic wrapper for errors that are not declared domain errors.
    #[error("message handling failed: {0}")]
    HandlingFailed(String),

    /// The retry interceptor exhausted its attempt budget.
    #[error("retry limit exceeded after {attempts} attempts: {last}")]
    RetryLimitExceeded {
        attempts: u32,
        last: Box<ExchangeError>,
    },

    /// A declared domain error, identified by its registered kind.
    #[error("{kind}: {message}")]
    Domain { kind: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ExchangeError {
    /// Transient conditions are never committed to the response store; the
    /// client keeps polling (or gives up with `Deferred`) instead of
    /// receiving them as a permanent outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Deferred { .. } | ExchangeError::Timeout(_) | ExchangeError::Cancelled
        )
    }

    /// Whether the retry interceptor may re-run the inner chain after this
    /// error. Cancellation, timeouts, and declared domain errors are
    /// critical and propagate immediately; storage-layer failures are the
    /// retriable class.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ExchangeError::Storage(_))
    }

    /// The kind name used for serialization in a [`FailureModel`].
    pub fn kind(&self) -> &str {
        match self {
            ExchangeError::NotRegistered { .. } => kinds::NOT_REGISTERED,
            ExchangeError::Deferred { .. } => kinds::DEFERRED,
            ExchangeError::Timeout(_) => kinds::TIMEOUT,
            ExchangeError::Cancelled => kinds::CANCELLED,
            ExchangeError::HandlingFailed(_) => kinds::HANDLING_FAILED,
            ExchangeError::RetryLimitExceeded { .. } => kinds::RETRY_LIMIT_EXCEEDED,
            ExchangeError::Domain { kind, .. } => kind,
            ExchangeError::Storage(StorageError::ConcurrencyExceeded { .. }) => {
                kinds::CONCURRENCY_EXCEEDED
            }
            ExchangeError::Storage(_) => kinds::STORAGE,
        }
    }
}

/// Well-known failure kind names.
pub mod kinds {
    pub const NOT_REGISTERED: &str = "not_registered";
    pub const DEFERRED: &str = "deferred";
    pub const TIMEOUT: &str = "timeout";
    pub const CANCELLED: &str = "cancelled";
    pub const HANDLING_FAILED: &str = "handling_failed";
    pub const RETRY_LIMIT_EXCEEDED: &str = "retry_limit_exceeded";
    pub const CONCURRENCY_EXCEEDED: &str = "concurrency_exceeded";
    pub const STORAGE: &str = "storage";
}

/// Serialization-safe surrogate for an error crossing a process boundary.
///
/// The original error type is not guaranteed to exist on the remote side, so
/// only the kind name, message, and an optional inner failure survive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureModel {
    pub kind: String,
    pub message: String,
    pub inner: Option<Box<FailureModel>>,
}

impl FailureModel {
    pub fn new(kind: &str, message: String) -> Self {
        Self {
            kind: kind.to_string(),
            message,
            inner: None,
        }
    }

    /// Captures an [`ExchangeError`] as a surrogate, preserving one level of
    /// wrapped cause for `RetryLimitExceeded`.
    pub fn from_error(error: &ExchangeError) -> Self {
        let inner = match error {
            ExchangeError::RetryLimitExceeded { last, .. } => {
                Some(Box::new(FailureModel::from_error(last)))
            }
            _ => None,
        };

        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            inner,
        }
    }
}

type Constructor = fn(&FailureModel) -> ExchangeError;

/// Maps known failure kind names to constructors.
///
/// Applications extend it with their own domain kinds via [`register`];
/// anything unknown is rebuilt as `ExchangeError::Domain` carrying the
/// original kind and message, never through dynamic type loading.
///
/// [`register`]: FailureRegistry::register
pub struct FailureRegistry {
    constructors: HashMap<String, Constructor>,
}

impl FailureRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };

        registry.register(kinds::NOT_REGISTERED, |model| ExchangeError::NotRegistered {
            message_type: model.message.clone(),
        });
        registry.register(kinds::DEFERRED, |model| ExchangeError::Deferred {
            fingerprint: model.message.clone(),
        });
        registry.register(kinds::TIMEOUT, |_| {
            ExchangeError::Timeout(Duration::default())
        });
        registry.register(kinds::CANCELLED, |_| ExchangeError::Cancelled);
        registry.register(kinds::HANDLING_FAILED, |model| {
            ExchangeError::HandlingFailed(model.message.clone())
        });
        registry.register(kinds::RETRY_LIMIT_EXCEEDED, |model| {
            let last = match &model.inner {
                Some(inner) => FailureRegistry::new().rebuild(inner),
                None => ExchangeError::HandlingFailed(model.message.clone()),
            };
            ExchangeError::RetryLimitExceeded {
                attempts: 0,
                last: Box::new(last),
            }
        });
        registry.register(kinds::CONCURRENCY_EXCEEDED, |model| {
            ExchangeError::Storage(StorageError::ConcurrencyExceeded {
                key: model.message.clone(),
                attempts: 0,
            })
        });

        registry
    }

    /// Registers a constructor for a domain error kind.
    pub fn register(&mut self, kind: &str, constructor: Constructor) {
        self.constructors.insert(kind.to_string(), constructor);
    }

    /// Rebuilds an error from its surrogate. Unknown kinds become a generic
    /// domain error carrying the original kind name and message.
    pub fn rebuild(&self, model: &FailureModel) -> ExchangeError {
        match self.constructors.get(model.kind.as_str()) {
            Some(constructor) => constructor(model),
            None => ExchangeError::Domain {
                kind: model.kind.clone(),
                message: model.message.clone(),
            },
        }
    }
}

impl Default for FailureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Cancelled.is_transient());
        assert!(ExchangeError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(
            ExchangeError::Deferred {
                fingerprint: "abc".to_string()
            }
            .is_transient()
        );

        assert!(!ExchangeError::HandlingFailed("boom".to_string()).is_transient());
        assert!(
            !ExchangeError::NotRegistered {
                message_type: "x".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_retriable_classification() {
        let contention = ExchangeError::Storage(StorageError::ConcurrencyExceeded {
            key: "k".to_string(),
            attempts: 3,
        });
        assert!(contention.is_retriable());

        assert!(!ExchangeError::Cancelled.is_retriable());
        assert!(!ExchangeError::Timeout(Duration::from_secs(1)).is_retriable());
        assert!(
            !ExchangeError::Domain {
                kind: "inventory_empty".to_string(),
                message: "none left".to_string()
            }
            .is_retriable()
        );
    }

    #[test]
    fn test_failure_model_roundtrip_known_kind() {
        let original = ExchangeError::HandlingFailed("database unavailable".to_string());
        let model = FailureModel::from_error(&original);

        let json = serde_json::to_string(&model).unwrap();
        let restored: FailureModel = serde_json::from_str(&json).unwrap();

        let rebuilt = FailureRegistry::new().rebuild(&restored);
        match rebuilt {
            ExchangeError::HandlingFailed(message) => {
                assert!(message.contains("database unavailable"))
            }
            other => panic!("unexpected rebuild: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_degrades_to_domain() {
        let model = FailureModel::new("quota_exceeded", "too many requests".to_string());

        let rebuilt = FailureRegistry::new().rebuild(&model);
        match rebuilt {
            ExchangeError::Domain { kind, message } => {
                assert_eq!(kind, "quota_exceeded");
                assert_eq!(message, "too many requests");
            }
            other => panic!("unexpected rebuild: {other:?}"),
        }
    }

    #[test]
    fn test_registered_domain_kind_wins_over_fallback() {
        let mut registry = FailureRegistry::new();
        registry.register("inventory_empty", |model| ExchangeError::Domain {
            kind: "inventory_empty".to_string(),
            message: format!("rebuilt: {}", model.message),
        });

        let model = FailureModel::new("inventory_empty", "none left".to_string());
        match registry.rebuild(&model) {
            ExchangeError::Domain { message, .. } => assert_eq!(message, "rebuilt: none left"),
            other => panic!("unexpected rebuild: {other:?}"),
        }
    }

    #[test]
    fn test_retry_limit_preserves_inner_failure() {
        let original = ExchangeError::RetryLimitExceeded {
            attempts: 3,
            last: Box::new(ExchangeError::HandlingFailed("flaky".to_string())),
        };

        let model = FailureModel::from_error(&original);
        assert_eq!(model.kind, kinds::RETRY_LIMIT_EXCEEDED);
        assert_eq!(model.inner.as_ref().unwrap().kind, kinds::HANDLING_FAILED);

        match FailureRegistry::new().rebuild(&model) {
            ExchangeError::RetryLimitExceeded { last, .. } => match *last {
                ExchangeError::HandlingFailed(message) => assert!(message.contains("flaky")),
                other => panic!("unexpected inner: {other:?}"),
            },
            other => panic!("unexpected rebuild: {other:?}"),
        }
    }
}
