//! Shared retry loop for probe and chunk attempts
//!
//! Transient failures are retried after a fixed delay until the attempt
//! budget runs out. Fatal errors (bad credentials, invalid URLs, local
//! filesystem problems) short-circuit the loop immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, TransferError};

/// How many times to try an operation, and how long to wait between tries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub delay: Duration,
    /// Optional wall-clock cap on a single attempt.
    pub attempt_timeout: Option<Duration>,
}

/// A successful value plus how many retries it took to get there.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub retries: u32,
}

/// Run `operation` under `policy`, retrying recoverable failures.
///
/// `label` identifies the operation in logs and in the exhaustion error.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<RetryOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.delay).await;
        }

        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result,
                Err(_) => Err(TransferError::Timeout {
                    url: label.to_string(),
                    limit,
                }),
            },
            None => operation().await,
        };

        match result {
            Ok(value) => {
                return Ok(RetryOutcome {
                    value,
                    retries: attempt,
                });
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "attempt failed, will retry"
                );
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(TransferError::RetriesExhausted {
        label: label.to_string(),
        max_attempts: policy.max_attempts,
        last_error: last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
            attempt_timeout: None,
        }
    }

    fn transient(msg: &str) -> TransferError {
        TransferError::Status {
            url: msg.to_string(),
            status: 500,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let outcome = run_with_retry(&quick_policy(10), "test", move || {
            let calls = calls_in.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(transient("flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.retries, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let result: Result<RetryOutcome<u32>> = run_with_retry(&quick_policy(10), "test", move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransferError::Authentication {
                    url: "http://example.invalid".to_string(),
                    status: 401,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(TransferError::Authentication { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_label_and_last_error() {
        let result: Result<RetryOutcome<u32>> =
            run_with_retry(&quick_policy(3), "chunk 2", || async { Err(transient("boom")) }).await;

        match result {
            Err(TransferError::RetriesExhausted {
                label,
                max_attempts,
                last_error,
            }) => {
                assert_eq!(label, "chunk 2");
                assert_eq!(max_attempts, 3);
                assert!(last_error.contains("500"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn attempt_timeout_turns_hangs_into_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
            attempt_timeout: Some(Duration::from_millis(10)),
        };

        let result: Result<RetryOutcome<u32>> = run_with_retry(&policy, "slow", move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                unreachable!()
            }
        })
        .await;

        assert!(matches!(result, Err(TransferError::RetriesExhausted { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
