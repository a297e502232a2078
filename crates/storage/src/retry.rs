//! Exponential backoff retry for transient storage failures, per §4.7/§5:
//! Postgres serialization failures and deadlocks (40001/40P01) retry up to 5
//! times with base 100ms and ±25% jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::StorageError;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 100;

/// Runs `op` up to [`MAX_ATTEMPTS`] times, retrying only on
/// [`StorageError::is_retryable`] errors, with exponential backoff and
/// jitter between attempts.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_ATTEMPTS && err.is_retryable() => {
                let delay = backoff_delay(attempt);
                tracing::warn!(attempt, ?delay, "retrying transient storage error: {}", err);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_DELAY_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
    let millis = (base as f64 * (1.0 + jitter_frac)).max(0.0) as u64;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_ok() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Invariant("bad state".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_on_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Connection(sqlx::Error::PoolTimedOut))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
