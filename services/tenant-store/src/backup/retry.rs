use std::future::Future;
use std::time::Duration;

use ledgerbox_object_store::RemoteError;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Timeout and exponential backoff applied to every remote call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping.
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            call_timeout,
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. Auth errors return immediately.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0u32;
        let mut backoff = self.initial_backoff;

        loop {
            let outcome = match timeout(self.call_timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RemoteError::Timeout(self.call_timeout)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "remote call recovered");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    // 0-50% jitter on top of the current backoff
                    let jitter = backoff.mul_f64(rand::random::<f64>() * 0.5);
                    let delay = backoff + jitter;
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying remote call"
                    );
                    sleep(delay).await;
                    attempt += 1;
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("list_files", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RemoteError::Transient("503".into()))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run("upload_file", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Auth("401".into()))
            })
            .await;
        assert!(matches!(result, Err(RemoteError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run("delete_file", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Transient("502".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let policy = RetryPolicy::no_retry(Duration::from_millis(20));
        let result: Result<(), _> = policy
            .run("list_folders", || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(RemoteError::Timeout(_))));
    }
}
