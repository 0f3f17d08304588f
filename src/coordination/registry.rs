//! Handler Registry
//!
//! Maps message type names to type-erased async handlers supplied by
//! application code. The registry is the innermost stage of the interceptor
//! pipeline: a dispatch for an unknown type raises `NotRegistered`.

use super::types::MessageEnvelope;
use crate::error::ExchangeError;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Type alias for a thread-safe, asynchronous message handler.
/// Receives the envelope and a cancellation token, resolves to the response
/// payload or an error.
pub type HandlerFn = Arc<
    dyn Fn(
            MessageEnvelope,
            CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ExchangeError>> + Send>>
        + Send
        + Sync,
>;

/// Registry holding the mapping between message types and their handlers.
pub struct HandlerRegistry {
    handlers: DashMap<String, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: DashMap::new(),
        })
    }

    /// Registers a handler for a message type.
    pub fn register<F, Fut>(&self, message_type: &str, handler: F)
    where
        F: Fn(MessageEnvelope, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, ExchangeError>> + Send + 'static,
    {
        let handler_fn: HandlerFn = Arc::new(move |envelope, cancel| {
            Box::pin(handler(envelope, cancel))
                as Pin<Box<dyn Future<Output = Result<Vec<u8>, ExchangeError>> + Send>>
        });

        self.handlers.insert(message_type.to_string(), handler_fn);

        tracing::info!("registered handler for '{}'", message_type);
    }

    /// Looks up and executes the handler for an envelope's message type.
    pub async fn execute(
        &self,
        envelope: MessageEnvelope,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, ExchangeError> {
        let handler = self
            .handlers
            .get(&envelope.message_type)
            .map(|entry| entry.value().clone());

        match handler {
            Some(handler) => handler(envelope, cancel).await,
            None => Err(ExchangeError::NotRegistered {
                message_type: envelope.message_type,
            }),
        }
    }

    pub fn has_handler(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
