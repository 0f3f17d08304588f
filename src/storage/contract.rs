//! Storage Contract
//!
//! The pluggable provider interface every backend must satisfy. Any store
//! honoring these concurrency guarantees (in-memory map, document store,
//! relational table) can carry the exchange without protocol changes.
//!
//! ## Guarantees
//! - **`add_or_get`**: under concurrent callers racing on one key, exactly one
//!   factory result is durably stored and all callers observe that value.
//!   This is the idempotency primitive behind response commit.
//! - **`add_or_update`**: optimistic concurrency; the write is conditioned on
//!   the version read, and the whole read-modify-write is retried a bounded
//!   number of times before surfacing `ConcurrencyExceeded`.
//! - Absence is `Ok(None)`, never an error.

use super::record::{StoreKey, ValueRecord};
use crate::error::StorageError;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// Boxed future producing content for a storage write.
pub type ContentFuture = BoxFuture<'static, Result<Vec<u8>, StorageError>>;

/// One-shot factory producing the content of a new value.
///
/// May resolve to [`StorageError::Aborted`] to decline the write; nothing is
/// stored in that case and the error propagates to the caller.
pub type AddFactory = Box<dyn FnOnce() -> ContentFuture + Send>;

/// Factory producing updated content from the current record. Invoked once
/// per optimistic-concurrency attempt, so it must be re-runnable.
pub type UpdateFactory = Box<dyn Fn(ValueRecord) -> ContentFuture + Send + Sync>;

/// Base key-value contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns the existing value, or computes one via `add` and inserts it.
    ///
    /// Concurrent callers racing on the same key collapse: at most one
    /// factory runs to completion, its result becomes the durable value, and
    /// every caller observes that same record.
    async fn add_or_get(&self, key: &StoreKey, add: AddFactory)
    -> Result<ValueRecord, StorageError>;

    /// Inserts via `add` when absent; otherwise writes `update(current)` as a
    /// new version under optimistic concurrency.
    async fn add_or_update(
        &self,
        key: &StoreKey,
        add: AddFactory,
        update: UpdateFactory,
    ) -> Result<ValueRecord, StorageError>;

    /// Reads the current (highest-version) value.
    async fn try_get(&self, key: &StoreKey) -> Result<Option<ValueRecord>, StorageError>;

    /// Removes a key entirely, returning the removed current value.
    async fn try_remove(&self, key: &StoreKey) -> Result<Option<ValueRecord>, StorageError>;
}

/// Versioned storage keeping every written snapshot until compacted.
#[async_trait]
pub trait HistoricalStorage: Storage {
    /// Returns the exact snapshot at `version`, never the latest unless the
    /// latest happens to carry that version.
    async fn try_get_version(
        &self,
        key: &StoreKey,
        version: i64,
    ) -> Result<Option<ValueRecord>, StorageError>;

    /// Deletes all snapshots with version <= `up_to_version`, returning how
    /// many were removed.
    async fn try_remove_up_to(
        &self,
        key: &StoreKey,
        up_to_version: i64,
    ) -> Result<usize, StorageError>;
}

/// Per-key append-only log storage.
#[async_trait]
pub trait PartitionedStorage: Send + Sync {
    /// Appends an entry under `key`, assigning the next dense index.
    /// Entries are immutable once appended.
    async fn add(&self, key: &str, content: Vec<u8>) -> Result<i64, StorageError>;

    /// Reads one entry by its index.
    async fn try_get(&self, key: &str, index: i64) -> Result<Option<ValueRecord>, StorageError>;

    /// Enumerates distinct keys with at least one entry.
    async fn get_keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Key enumeration, used by compaction jobs and diagnostics.
#[async_trait]
pub trait AdminStorage: Send + Sync {
    async fn get_keys(&self) -> Result<Vec<StoreKey>, StorageError>;
}

/// Convenience factory for content that is already known.
pub fn ready_content(content: Vec<u8>) -> AddFactory {
    Box::new(move || Box::pin(async move { Ok(content) }))
}
