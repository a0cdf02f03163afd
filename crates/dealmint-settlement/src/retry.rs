//! Exponential backoff for transient failures.

use std::fmt::Display;
use std::future::Future;

use dealmint_store::StoreError;
use dealmint_types::{DealmintError, Result, RetryPolicy};

/// Errors that may clear up if the same call is repeated.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DealmintError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// Run `f` until it succeeds, fails permanently, or `policy.max_attempts`
/// is spent. Returns the last error.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut f: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(op, attempt, ?delay, error = %e, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`with_backoff`] that reports a spent budget as
/// [`DealmintError::RetriesExhausted`].
pub async fn retrying<T, F, Fut>(policy: &RetryPolicy, op: &str, f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_backoff(policy, op, f).await.map_err(|e| {
        if e.is_retryable() {
            tracing::warn!(op, attempts = policy.max_attempts, error = %e, "retries exhausted");
            DealmintError::RetriesExhausted {
                op: op.to_string(),
                attempts: policy.max_attempts,
                last: e.to_string(),
            }
        } else {
            e
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> DealmintError {
        DealmintError::StoreConflict {
            entity: "stake".into(),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retrying(&RetryPolicy::immediate(5), "op", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(conflict())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retrying(&RetryPolicy::immediate(5), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DealmintError::NoStake)
        })
        .await;
        assert_eq!(result.unwrap_err(), DealmintError::NoStake);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_is_reported() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retrying(&RetryPolicy::immediate(3), "stake", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;
        assert!(matches!(
            result.unwrap_err(),
            DealmintError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn store_backend_errors_are_transient() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&RetryPolicy::immediate(4), "append", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Backend("flaky".into()))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
