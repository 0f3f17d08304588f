use crate::error::{ExchangeError, FailureModel, FailureRegistry, StorageError};
use serde::{Deserialize, Serialize};

/// Uniquely identifies a logical value within a store.
///
/// The `id` is typically a content fingerprint; `value_type` separates values
/// of different shapes sharing the same id space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub id: String,
    pub value_type: String,
}

impl StoreKey {
    pub fn new(id: &str, value_type: &str) -> Self {
        Self {
            id: id.to_string(),
            value_type: value_type.to_string(),
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.value_type, self.id)
    }
}

/// A stored payload plus its monotonically increasing version.
///
/// The version doubles as a change counter and the optimistic-concurrency
/// token: it only ever increases and is never reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueRecord {
    pub content: Vec<u8>,
    pub version: i64,
    pub created: u64,
    pub updated: u64,
}

impl ValueRecord {
    pub fn new(content: Vec<u8>, version: i64) -> Self {
        let now = now_ms();
        Self {
            content,
            version,
            created: now,
            updated: now,
        }
    }
}

/// Addresses one historical snapshot of a key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KeyVersion {
    pub key: StoreKey,
    pub version: i64,
}

/// Addresses one entry in a per-key append-only log.
///
/// Indices are dense, assigned by the store starting at
/// [`PARTITION_ORIGIN`], and never reused or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub id: String,
    pub index: i64,
}

/// First index assigned within any partition.
pub const PARTITION_ORIGIN: i64 = 1;

/// The committed outcome of a message: either the response payload or a
/// serializable surrogate of the error the handler raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CachingResult {
    Value(Vec<u8>),
    Exception(FailureModel),
}

impl CachingResult {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(content: &[u8]) -> Result<Self, StorageError> {
        Ok(serde_json::from_slice(content)?)
    }

    /// Unwraps the stored outcome, rebuilding and re-raising the original
    /// error on the `Exception` variant.
    pub fn into_outcome(self, failures: &FailureRegistry) -> Result<Vec<u8>, ExchangeError> {
        match self {
            CachingResult::Value(content) => Ok(content),
            CachingResult::Exception(model) => Err(failures.rebuild(&model)),
        }
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
