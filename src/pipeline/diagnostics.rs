use super::{Interceptor, Next};
use crate::coordination::types::MessageEnvelope;
use crate::error::ExchangeError;
use async_trait::async_trait;
use tracing::Instrument;

/// Outermost stage: spans every dispatch so each outcome (success, cache
/// hit, or failure) is observed under an operation named after the message
/// type. The span closes on every exit path, exceptions included.
pub struct DiagnosticsInterceptor;

#[async_trait]
impl Interceptor for DiagnosticsInterceptor {
    async fn invoke(
        &self,
        envelope: MessageEnvelope,
        next: Next,
    ) -> Result<Vec<u8>, ExchangeError> {
        let span = tracing::info_span!(
            "handle_message",
            message_type = %envelope.message_type,
            fingerprint = %envelope.fingerprint,
            correlation_id = %envelope.audit.correlation_id,
        );

        let message_type = envelope.message_type.clone();
        let result = next.run(envelope).instrument(span).await;

        match &result {
            Ok(_) => tracing::debug!("handled '{}'", message_type),
            Err(error) => tracing::warn!("handling '{}' failed: {}", message_type, error),
        }

        result
    }
}
