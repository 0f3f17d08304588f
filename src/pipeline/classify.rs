use super::{Interceptor, Next};
use crate::coordination::types::MessageEnvelope;
use crate::error::ExchangeError;
use async_trait::async_trait;

/// Normalizes errors at a single boundary: anything that is not already a
/// declared exchange condition is wrapped into a generic `HandlingFailed`.
/// Declared domain errors and timeout/cancellation pass through unchanged.
pub struct ClassifyInterceptor;

#[async_trait]
impl Interceptor for ClassifyInterceptor {
    async fn invoke(
        &self,
        envelope: MessageEnvelope,
        next: Next,
    ) -> Result<Vec<u8>, ExchangeError> {
        match next.run(envelope).await {
            Ok(value) => Ok(value),
            Err(error @ ExchangeError::Storage(_)) => {
                Err(ExchangeError::HandlingFailed(error.to_string()))
            }
            Err(error) => Err(error),
        }
    }
}
