//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Attempt budget and backoff schedule for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub growth_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            growth_factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, growth_factor: u32) -> Self {
        Self {
            max_attempts,
            initial_delay,
            growth_factor,
        }
    }

    /// Delay slept after the `attempt`-th failure: `initial × factor^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let multiplier = self
            .growth_factor
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(multiplier)
    }
}

/// Run `op` until it succeeds or the attempt budget is spent, returning the
/// last error. `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts => {
                let wait = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "operation failed, retrying"
                );
                sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), 2)
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicU32::new(0);
        let res: Result<u32, String> = retry_with_backoff(fast_policy(4), |_| {
            let current = counter.fetch_add(1, Ordering::Relaxed);
            async move {
                if current < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn propagates_last_error_after_budget() {
        let counter = AtomicU32::new(0);
        let res: Result<(), String> = retry_with_backoff(fast_policy(3), |attempt| {
            counter.fetch_add(1, Ordering::Relaxed);
            async move { Err(format!("failure #{attempt}")) }
        })
        .await;

        assert_eq!(res.unwrap_err(), "failure #3");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let counter = AtomicU32::new(0);
        let res: Result<(), String> = retry_with_backoff(fast_policy(0), |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            async { Err("nope".to_string()) }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
