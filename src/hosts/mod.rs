//! Host Selection
//!
//! Routes messages to server instances through a TTL'd registration table
//! kept in the backing store.
//!
//! ## Core Concepts
//! - **Registration**: a server's claim that it accepts certain message
//!   types (or everything, via accept-others), valid until its expiry.
//! - **Selection**: explicit acceptors win over accept-others fallbacks;
//!   ties round-robin through an atomic counter.
//! - **Staleness**: an expired chosen match forces one refresh from the
//!   store; a still-empty match set raises `NotRegistered`.

pub mod registry;
pub mod selector;
pub mod types;
