//! Interceptor Pipeline
//!
//! Every local handler invocation runs through an ordered wrapper chain
//! composed once at startup:
//!
//! 1. **`diagnostics`**: opens a span named after the message type and marks
//!    it failed on any error; the span always closes.
//! 2. **`classify`**: wraps undeclared errors into a generic handling
//!    failure; declared domain errors and timeout/cancellation pass through.
//! 3. **`timeout`**: bounds the inner chain with a deadline; expiry is a
//!    transient condition, not a permanent failure.
//! 4. **`caching`**: memoizes outcomes by content fingerprint through the
//!    result store's idempotent insert. This stage is the only one touching
//!    persistent state; it doubles as the server's response commit.
//! 5. **`retry`**: re-runs the inner chain on retriable errors per a backoff
//!    strategy; critical errors propagate immediately.
//!
//! Ordering matters: caching below timeout keeps even a slow store bounded;
//! retry below caching means a cache hit never re-runs anything.

pub mod caching;
pub mod classify;
pub mod diagnostics;
pub mod retry;
pub mod timeout;

mod tests;

use crate::coordination::types::MessageEnvelope;
use crate::error::ExchangeError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Boxed future of a handler outcome.
pub type HandlerFuture = BoxFuture<'static, Result<Vec<u8>, ExchangeError>>;

/// The innermost stage: the locally registered handler.
pub type Terminal = Arc<dyn Fn(MessageEnvelope) -> HandlerFuture + Send + Sync>;

/// One stage of the chain. Receives the message and the remainder of the
/// chain; may run `next` zero, one, or several times.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn invoke(
        &self,
        envelope: MessageEnvelope,
        next: Next,
    ) -> Result<Vec<u8>, ExchangeError>;
}

/// Owned cursor over the remainder of the chain. Cloneable so stages like
/// retry can re-run their inner chain, and `'static` so the caching stage
/// can move it into a storage factory.
#[derive(Clone)]
pub struct Next {
    stages: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    terminal: Terminal,
}

impl Next {
    /// Runs the rest of the chain for `envelope`.
    pub fn run(self, envelope: MessageEnvelope) -> HandlerFuture {
        if self.index < self.stages.len() {
            let stage = self.stages[self.index].clone();
            let next = Next {
                stages: self.stages,
                index: self.index + 1,
                terminal: self.terminal,
            };
            Box::pin(async move { stage.invoke(envelope, next).await })
        } else {
            (self.terminal)(envelope)
        }
    }
}

/// An ordered interceptor chain composed at startup.
pub struct Pipeline {
    stages: Arc<[Arc<dyn Interceptor>]>,
    terminal: Terminal,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { stages: Vec::new() }
    }

    /// Dispatches one message through every stage down to the handler.
    pub async fn dispatch(&self, envelope: MessageEnvelope) -> Result<Vec<u8>, ExchangeError> {
        let next = Next {
            stages: self.stages.clone(),
            index: 0,
            terminal: self.terminal.clone(),
        };
        next.run(envelope).await
    }
}

/// Collects stages in outer-to-inner order.
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl PipelineBuilder {
    pub fn with(mut self, stage: Arc<dyn Interceptor>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self, terminal: Terminal) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
            terminal,
        }
    }
}
