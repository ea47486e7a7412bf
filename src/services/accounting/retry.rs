use std::future::Future;
use std::time::Duration;

use crate::services::accounting::connector::{ConnectorError, RETRYABLE_STATUSES};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub fn default_retry_delays() -> Vec<Duration> {
    [1, 2, 4, 8, 16].into_iter().map(Duration::from_secs).collect()
}

/// Exponential backoff for vendor list calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before retry `n` is `delays[min(n, len - 1)]`.
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delays: default_retry_delays(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        let delays = if delays.is_empty() {
            default_retry_delays()
        } else {
            delays
        };
        Self {
            max_attempts: max_attempts.max(1),
            delays,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(1, vec![Duration::ZERO])
    }

    pub fn delay_for(&self, attempt: usize) -> Duration {
        let index = attempt.min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or_default()
    }

    fn should_abort(error: &ConnectorError) -> bool {
        let status_retryable = error
            .status()
            .map_or(false, |status| RETRYABLE_STATUSES.contains(&status));
        !error.is_retryable() && !status_retryable
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ConnectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let mut attempt: usize = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let is_last = attempt + 1 >= self.max_attempts as usize;
                    if Self::should_abort(&e) || is_last {
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn unavailable() -> ConnectorError {
        ConnectorError::Api {
            status: 503,
            code: None,
            message: "Service Unavailable".to_string(),
        }
    }

    #[test]
    fn test_delay_index_clamps_to_last_entry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(12), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failures_then_success_waits_fifteen_seconds() {
        let policy = RetryPolicy::default();
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .run("list_customers", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 4 {
                    Err(unavailable())
                } else {
                    Ok("page")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("list_invoices", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::Api { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_aborts_immediately() {
        let policy = RetryPolicy::default();
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy
            .run("list_products", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ConnectorError::Authentication("invalid token".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
