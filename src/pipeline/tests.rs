//! Pipeline Module Tests
//!
//! Validates the interceptor chain's control flow: caching precedence,
//! single-invocation collapse, timeout transience, retry classification,
//! and error normalization.

#[cfg(test)]
mod tests {
    use crate::coordination::types::{Audit, MessageEnvelope, result_key};
    use crate::error::{ExchangeError, FailureRegistry, StorageError};
    use crate::pipeline::caching::CachingInterceptor;
    use crate::pipeline::classify::ClassifyInterceptor;
    use crate::pipeline::retry::RetryInterceptor;
    use crate::pipeline::timeout::TimeoutInterceptor;
    use crate::pipeline::{HandlerFuture, Pipeline, Terminal};
    use crate::backoff::ConstantBackoff;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::contract::Storage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn envelope(message_type: &str) -> MessageEnvelope {
        MessageEnvelope::new(
            message_type,
            serde_json::json!({"n": 1}),
            Audit::new("tester"),
            None,
        )
    }

    fn caching_pipeline(results: Arc<MemoryStorage>, terminal: Terminal) -> Pipeline {
        Pipeline::builder()
            .with(Arc::new(CachingInterceptor::new(
                results,
                Arc::new(FailureRegistry::new()),
            )))
            .build(terminal)
    }

    // ============================================================
    // CACHING
    // ============================================================

    #[tokio::test]
    async fn test_cache_hit_replays_without_inner_invocation() {
        let results = MemoryStorage::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted_calls = calls.clone();
        let terminal: Terminal = Arc::new(move |_env| -> HandlerFuture {
            let calls = counted_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(b"computed".to_vec())
            })
        });
        let pipeline = caching_pipeline(results, terminal);

        let first = pipeline.dispatch(envelope("stats.compute")).await.unwrap();
        let second = pipeline.dispatch(envelope("stats.compute")).await.unwrap();

        assert_eq!(first, b"computed");
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_exception_takes_precedence_over_new_handler() {
        let results = MemoryStorage::new();

        // First pipeline: the handler fails permanently.
        let failing: Terminal = Arc::new(|_env| -> HandlerFuture {
            Box::pin(async {
                Err(ExchangeError::Domain {
                    kind: "inventory_empty".to_string(),
                    message: "none left".to_string(),
                })
            })
        });
        let first = caching_pipeline(results.clone(), failing)
            .dispatch(envelope("order.place"))
            .await;
        assert!(first.is_err());

        // Second pipeline over the same result store: a healthy handler for
        // the identical message still replays the stored exception.
        let healthy: Terminal =
            Arc::new(|_env| -> HandlerFuture { Box::pin(async { Ok(b"fine now".to_vec()) }) });
        let second = caching_pipeline(results, healthy)
            .dispatch(envelope("order.place"))
            .await;

        match second {
            Err(ExchangeError::Domain { kind, .. }) => assert_eq!(kind, "inventory_empty"),
            other => panic!("expected the cached exception, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_collapse() {
        let results = MemoryStorage::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted_calls = calls.clone();
        let terminal: Terminal = Arc::new(move |_env| -> HandlerFuture {
            let calls = counted_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(b"slow result".to_vec())
            })
        });
        let pipeline = Arc::new(caching_pipeline(results, terminal));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                pipeline.dispatch(envelope("report.render")).await.unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), b"slow result");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_outcome_is_never_committed() {
        let results = MemoryStorage::new();

        let terminal: Terminal = Arc::new(|_env| -> HandlerFuture {
            Box::pin(async { Err(ExchangeError::Cancelled) })
        });
        let pipeline = caching_pipeline(results.clone(), terminal);

        let env = envelope("order.place");
        let fingerprint = env.fingerprint.clone();
        let outcome = pipeline.dispatch(env).await;

        assert!(matches!(outcome, Err(ExchangeError::Cancelled)));
        assert!(
            results
                .try_get(&result_key(&fingerprint))
                .await
                .unwrap()
                .is_none(),
            "transient outcomes must not reach the response store"
        );
    }

    // ============================================================
    // TIMEOUT
    // ============================================================

    #[tokio::test]
    async fn test_timeout_raises_transient_and_commits_nothing() {
        let results = MemoryStorage::new();

        let terminal: Terminal = Arc::new(|_env| -> HandlerFuture {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            })
        });
        let pipeline = Pipeline::builder()
            .with(Arc::new(TimeoutInterceptor::new(Duration::from_millis(20))))
            .with(Arc::new(CachingInterceptor::new(
                results.clone(),
                Arc::new(FailureRegistry::new()),
            )))
            .build(terminal);

        let env = envelope("slow.op");
        let fingerprint = env.fingerprint.clone();

        let outcome = pipeline.dispatch(env).await;
        match outcome {
            Err(error @ ExchangeError::Timeout(_)) => assert!(error.is_transient()),
            other => panic!("expected Timeout, got {other:?}"),
        }

        assert!(
            results
                .try_get(&result_key(&fingerprint))
                .await
                .unwrap()
                .is_none()
        );
    }

    // ============================================================
    // RETRY
    // ============================================================

    fn flaky_terminal(calls: Arc<AtomicUsize>, failures_before_success: usize) -> Terminal {
        Arc::new(move |_env| -> HandlerFuture {
            let calls = calls.clone();
            Box::pin(async move {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < failures_before_success {
                    Err(ExchangeError::Storage(StorageError::ConcurrencyExceeded {
                        key: "k".to_string(),
                        attempts: 1,
                    }))
                } else {
                    Ok(b"recovered".to_vec())
                }
            })
        })
    }

    fn retry_pipeline(terminal: Terminal, max_attempts: u32) -> Pipeline {
        Pipeline::builder()
            .with(Arc::new(RetryInterceptor::new(Arc::new(
                ConstantBackoff::new(Duration::from_millis(1), max_attempts),
            ))))
            .build(terminal)
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = retry_pipeline(flaky_terminal(calls.clone(), 2), 5);

        let outcome = pipeline.dispatch(envelope("flaky.op")).await.unwrap();

        assert_eq!(outcome, b"recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = retry_pipeline(flaky_terminal(calls.clone(), usize::MAX), 2);

        match pipeline.dispatch(envelope("flaky.op")).await {
            Err(ExchangeError::RetryLimitExceeded { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(
                    *last,
                    ExchangeError::Storage(StorageError::ConcurrencyExceeded { .. })
                ));
            }
            other => panic!("expected RetryLimitExceeded, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_critical_errors_skip_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted_calls = calls.clone();

        let terminal: Terminal = Arc::new(move |_env| -> HandlerFuture {
            let calls = counted_calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExchangeError::Domain {
                    kind: "inventory_empty".to_string(),
                    message: "none left".to_string(),
                })
            })
        });
        let pipeline = retry_pipeline(terminal, 5);

        let outcome = pipeline.dispatch(envelope("order.place")).await;

        assert!(matches!(outcome, Err(ExchangeError::Domain { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "critical errors retry nothing");
    }

    // ============================================================
    // CLASSIFICATION
    // ============================================================

    #[tokio::test]
    async fn test_classification_wraps_undeclared_errors() {
        let terminal: Terminal = Arc::new(|_env| -> HandlerFuture {
            Box::pin(async {
                Err(ExchangeError::Storage(StorageError::ConcurrencyExceeded {
                    key: "k".to_string(),
                    attempts: 10,
                }))
            })
        });
        let pipeline = Pipeline::builder()
            .with(Arc::new(ClassifyInterceptor))
            .build(terminal);

        match pipeline.dispatch(envelope("order.place")).await {
            Err(ExchangeError::HandlingFailed(message)) => {
                assert!(message.contains("write contention"))
            }
            other => panic!("expected HandlingFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_classification_passes_declared_conditions_through() {
        for declared in [
            ExchangeError::Timeout(Duration::from_secs(1)),
            ExchangeError::Cancelled,
            ExchangeError::Domain {
                kind: "inventory_empty".to_string(),
                message: "none left".to_string(),
            },
        ] {
            let kind_before = declared.kind().to_string();
            let terminal: Terminal = Arc::new(move |_env| -> HandlerFuture {
                let error = match &declared {
                    ExchangeError::Timeout(d) => ExchangeError::Timeout(*d),
                    ExchangeError::Cancelled => ExchangeError::Cancelled,
                    ExchangeError::Domain { kind, message } => ExchangeError::Domain {
                        kind: kind.clone(),
                        message: message.clone(),
                    },
                    _ => unreachable!(),
                };
                Box::pin(async move { Err(error) })
            });
            let pipeline = Pipeline::builder()
                .with(Arc::new(ClassifyInterceptor))
                .build(terminal);

            let outcome = pipeline.dispatch(envelope("any.op")).await;
            assert_eq!(outcome.unwrap_err().kind(), kind_before);
        }
    }
}
