//! Bounded exponential-backoff retry, scoped to the coordinator's single
//! outbound call to an upstream registry. Nothing else in this workspace
//! retries automatically: core storage operations surface failures straight
//! through, and verification failures are always terminal. Only the
//! transport-layer fetch gets a retry band.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_INTERVAL: Duration = Duration::from_millis(200);
const MAX_INTERVAL: Duration = Duration::from_secs(5);

fn backoff_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(INITIAL_INTERVAL)
        .with_max_interval(MAX_INTERVAL)
        .with_multiplier(2.0)
        .with_max_elapsed_time(None)
        .build()
}

/// Retries `f` up to [`MAX_ATTEMPTS`] times, sleeping per an exponential
/// backoff policy between attempts `is_retryable` accepts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = backoff_policy();
    let mut attempts = 0;

    loop {
        attempts += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempts >= MAX_ATTEMPTS || !is_retryable(&err) {
                    return Err(err);
                }
                let Some(delay) = backoff.next_backoff() else {
                    return Err(err);
                };
                warn!(
                    operation = operation_name,
                    attempts,
                    error = %err,
                    delay_ms = delay.as_millis(),
                    "upstream fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, &str> = retry_with_backoff("test", |_| true, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, &str> = retry_with_backoff("test", |_| true, move || {
            let calls = calls2.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err("transient")
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, &str> = retry_with_backoff("test", |_| false, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("terminal")
            }
        })
        .await;
        assert_eq!(result, Err("terminal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, &str> = retry_with_backoff("test", |_| true, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("always fails")
            }
        })
        .await;
        assert_eq!(result, Err("always fails"));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
    }
}
