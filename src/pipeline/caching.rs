use super::{Interceptor, Next};
use crate::coordination::types::{MessageEnvelope, result_key};
use crate::error::{ExchangeError, FailureModel, FailureRegistry, StorageError};
use crate::storage::contract::{AddFactory, Storage};
use crate::storage::record::CachingResult;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Memoizes outcomes by content fingerprint.
///
/// A hit replays the stored [`CachingResult`] without invoking the inner
/// chain, re-raising the rebuilt error on the `Exception` variant. A miss
/// runs the inner chain inside the store's `add_or_get` factory, so
/// concurrent identical requests collapse into a single inner invocation and
/// the first committed outcome wins for everyone.
///
/// Transient outcomes (timeout, deferred, cancellation) abort the factory:
/// nothing is stored, and the original condition propagates. This is the
/// rule that keeps "no response yet" out of the response store.
pub struct CachingInterceptor {
    results: Arc<dyn Storage>,
    failures: Arc<FailureRegistry>,
}

impl CachingInterceptor {
    pub fn new(results: Arc<dyn Storage>, failures: Arc<FailureRegistry>) -> Self {
        Self { results, failures }
    }
}

#[async_trait]
impl Interceptor for CachingInterceptor {
    async fn invoke(
        &self,
        envelope: MessageEnvelope,
        next: Next,
    ) -> Result<Vec<u8>, ExchangeError> {
        let key = result_key(&envelope.fingerprint);
        let fingerprint = envelope.fingerprint.clone();

        // Side channel for the transient error that made the factory abort.
        let aborted: Arc<Mutex<Option<ExchangeError>>> = Arc::new(Mutex::new(None));
        let aborted_slot = aborted.clone();

        let factory: AddFactory = Box::new(move || {
            Box::pin(async move {
                match next.run(envelope).await {
                    Ok(value) => CachingResult::Value(value).to_bytes(),
                    Err(error) if error.is_transient() => {
                        if let Ok(mut slot) = aborted_slot.lock() {
                            *slot = Some(error);
                        }
                        Err(StorageError::Aborted)
                    }
                    Err(error) => {
                        CachingResult::Exception(FailureModel::from_error(&error)).to_bytes()
                    }
                }
            })
        });

        match self.results.add_or_get(&key, factory).await {
            Ok(record) => {
                CachingResult::from_bytes(&record.content)?.into_outcome(&self.failures)
            }
            Err(StorageError::Aborted) => {
                let error = aborted
                    .lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .unwrap_or(ExchangeError::Deferred { fingerprint });
                Err(error)
            }
            Err(error) => Err(error.into()),
        }
    }
}
