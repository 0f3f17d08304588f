use super::{Interceptor, Next};
use crate::coordination::types::MessageEnvelope;
use crate::error::ExchangeError;
use async_trait::async_trait;
use std::time::Duration;

/// Bounds the inner chain with a deadline. On expiry the inner invocation is
/// cancelled (its future is dropped) and a transient `Timeout` condition is
/// raised. Outer layers and the protocol treat it like `Deferred`, never as
/// a permanent failure.
pub struct TimeoutInterceptor {
    deadline: Duration,
}

impl TimeoutInterceptor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }
}

#[async_trait]
impl Interceptor for TimeoutInterceptor {
    async fn invoke(
        &self,
        envelope: MessageEnvelope,
        next: Next,
    ) -> Result<Vec<u8>, ExchangeError> {
        let message_type = envelope.message_type.clone();

        match tokio::time::timeout(self.deadline, next.run(envelope)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    "handling '{}' exceeded the {:?} deadline",
                    message_type,
                    self.deadline
                );
                Err(ExchangeError::Timeout(self.deadline))
            }
        }
    }
}
