use super::{Interceptor, Next};
use crate::backoff::BackoffStrategy;
use crate::coordination::types::MessageEnvelope;
use crate::error::ExchangeError;
use async_trait::async_trait;
use std::sync::Arc;

/// Re-runs the inner chain on retriable errors.
///
/// Critical errors (cancellation, timeout, declared domain errors) propagate
/// immediately. Retriable ones are re-attempted per the backoff strategy;
/// exhausting the budget raises `RetryLimitExceeded` wrapping the last error
/// seen.
pub struct RetryInterceptor {
    backoff: Arc<dyn BackoffStrategy>,
}

impl RetryInterceptor {
    pub fn new(backoff: Arc<dyn BackoffStrategy>) -> Self {
        Self { backoff }
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    async fn invoke(
        &self,
        envelope: MessageEnvelope,
        next: Next,
    ) -> Result<Vec<u8>, ExchangeError> {
        let mut attempt = 1;

        loop {
            match next.clone().run(envelope.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retriable() => return Err(error),
                Err(error) => {
                    if !self.backoff.can_retry(attempt) {
                        return Err(ExchangeError::RetryLimitExceeded {
                            attempts: attempt,
                            last: Box::new(error),
                        });
                    }

                    tracing::debug!(
                        "retrying '{}' after attempt {}: {}",
                        envelope.message_type,
                        attempt,
                        error
                    );
                    tokio::time::sleep(self.backoff.delay_time(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}
