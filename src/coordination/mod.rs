//! Coordination Protocol
//!
//! The publish/poll choreography between clients and servers, built entirely
//! on the storage contract; no broker, no direct connection.
//!
//! ## Flow
//! 1. **Publish**: the client fingerprints the message, resolves a target
//!    instance via host selection, and appends an envelope to that
//!    instance's request log together with a paired audit record.
//! 2. **Process**: the server's sequential loop reads the log by index,
//!    restores caller context from the audit, and dispatches through the
//!    interceptor pipeline; the caching stage commits the outcome under the
//!    fingerprint, first writer wins.
//! 3. **Poll**: for request/response calls the client polls the response
//!    store by fingerprint per its backoff strategy, re-raising stored
//!    failures or giving up with `Deferred`.
//!
//! Delivery is at-least-once for handler execution and at-most-once for the
//! response commit.

pub mod client;
pub mod registry;
pub mod server;
pub mod types;
