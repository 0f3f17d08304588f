//! Broker-less Message Exchange Library
//!
//! This library crate lets independent processes exchange request/response
//! and fire-and-forget messages without a dedicated broker, using a generic
//! pluggable key-value store as both transport and ledger.
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems:
//!
//! - **`storage`**: The transport layer. A generic K/V contract with
//!   versioned history, append-only partitions, and the optimistic
//!   concurrency guarantees the protocol depends on, plus an in-memory
//!   reference provider.
//! - **`backoff`**: Pure attempt-indexed retry policies shared by the client
//!   poll loop and the retry interceptor.
//! - **`pipeline`**: The ordered interceptor chain (diagnostics,
//!   classification, timeout, caching, retry) wrapping every local handler
//!   invocation.
//! - **`hosts`**: TTL'd host registration and round-robin instance
//!   selection.
//! - **`coordination`**: The publish/poll protocol: client, sequential
//!   server loop, and handler registry.
//! - **`error`**: The error taxonomy and the serializable failure surrogate
//!   used to carry exceptions across process boundaries.

pub mod backoff;
pub mod config;
pub mod coordination;
pub mod error;
pub mod fingerprint;
pub mod hosts;
pub mod pipeline;
pub mod storage;
