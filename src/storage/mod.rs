//! Storage Core
//!
//! The generic key-value contract the whole exchange stands on, plus its
//! in-memory reference provider.
//!
//! ## Core Concepts
//! - **Contract**: `Storage` (idempotent insert, optimistic update),
//!   `HistoricalStorage` (versioned snapshots and compaction),
//!   `PartitionedStorage` (per-key append-only logs with dense indices),
//!   `AdminStorage` (key enumeration).
//! - **Records**: every stored value is a `ValueRecord` carrying content,
//!   a strictly increasing version, and timestamps.
//! - **Providers**: any backend satisfying the contract's concurrency
//!   guarantees plugs in without protocol changes; `MemoryStorage` is the
//!   canonical in-process one.

pub mod contract;
pub mod memory;
pub mod record;
