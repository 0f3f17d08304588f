use crate::fingerprint::fingerprint;
use crate::storage::record::{StoreKey, now_ms};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Correlation and caller metadata carried alongside every coordinated
/// message. The server restores caller context (correlation id, user) from
/// this record before invoking the handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Audit {
    pub correlation_id: String,
    pub user: String,
    pub requested: u64,
    pub completed: Option<u64>,
    pub details: HashMap<String, String>,
}

impl Audit {
    pub fn new(user: &str) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            user: user.to_string(),
            requested: now_ms(),
            completed: None,
            details: HashMap::new(),
        }
    }
}

/// The entry appended to a per-instance request log.
///
/// The fingerprint is computed once at publish time and never changes; it is
/// the response-correlation key. `expires` is only set for request/response
/// calls, stamped with the client's whole polling budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_type: String,
    pub payload: serde_json::Value,
    pub fingerprint: String,
    pub audit: Audit,
    pub expires: Option<u64>,
}

impl MessageEnvelope {
    pub fn new(
        message_type: &str,
        payload: serde_json::Value,
        audit: Audit,
        expires: Option<u64>,
    ) -> Self {
        let fingerprint = fingerprint(message_type, &payload);
        Self {
            message_type: message_type.to_string(),
            payload,
            fingerprint,
            audit,
            expires,
        }
    }
}

/// Value type tags used for store keys.
pub mod value_types {
    pub const CACHING_RESULT: &str = "CachingResult";
    pub const AUDIT: &str = "Audit";
    pub const CURSOR: &str = "Cursor";
}

/// Key of a committed response, addressed by the request's fingerprint.
pub fn result_key(fingerprint: &str) -> StoreKey {
    StoreKey::new(fingerprint, value_types::CACHING_RESULT)
}

/// Key of the audit record paired with one request-log entry.
pub fn audit_key(instance: &str, index: i64) -> StoreKey {
    StoreKey::new(&format!("{}/{}", instance, index), value_types::AUDIT)
}

/// Key of an instance's persisted processing cursor.
pub fn cursor_key(instance: &str) -> StoreKey {
    StoreKey::new(instance, value_types::CURSOR)
}
