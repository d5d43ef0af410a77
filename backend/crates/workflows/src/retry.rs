use std::future::Future;

use dust_config::RetryPolicy;

use crate::error::ActivityError;

/// Run an activity, retrying retryable failures with exponential backoff.
///
/// Non-retryable errors are returned immediately. Once `max_attempts` is
/// reached the last error is returned unchanged so the caller can still tell
/// a throttled run from a failed upsert.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    activity: &str,
    mut op: F,
) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                tracing::warn!(
                    activity,
                    attempts = attempt,
                    error = %e,
                    "activity retries exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.backoff_with_hint(attempt, e.retry_after());
                tracing::warn!(
                    activity,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    kind = e.kind(),
                    error = %e,
                    "activity failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 1, 5).unwrap()
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast_policy(3), "list", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ActivityError::TransientNetwork("reset".to_owned()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(&fast_policy(5), "token", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ActivityError::Config(
                    "NANGO_NOTION_CONNECTOR_ID not set".to_owned(),
                ))
            }
        })
        .await;

        assert!(matches!(result, Err(ActivityError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn returns_last_error_when_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(&fast_policy(3), "list", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ActivityError::RateLimited {
                    message: "429 Too Many Requests".to_owned(),
                    retry_after: Some(Duration::from_millis(1)),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ActivityError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
