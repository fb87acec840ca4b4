use crate::config::RetryConfig;
use backon::{ExponentialBuilder, Retryable};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff without jitter.
///
/// With `max_attempts = 3` and `base_delay = 1s` a failing call runs at t=0, t=1s
/// and t=3s, then returns the last error without waiting again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_settings(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }

    #[must_use]
    pub fn with_settings(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept after failed attempt `attempt` (1-based): `base_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1 << exponent)
    }

    fn backoff(&self) -> ExponentialBuilder {
        let retries = self.max_attempts - 1;
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(2.0)
            .with_max_delay(self.delay_after(retries.max(1)))
            .with_max_times(retries as usize)
    }

    /// Runs `op` until it succeeds or the attempts are used up.
    ///
    /// # Errors
    /// Returns the error of the last attempt.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_when(op, |_| true).await
    }

    /// Like [`RetryPolicy::run`], but stops early on errors for which `retryable` returns false.
    ///
    /// # Errors
    /// Returns the error of the last attempt made.
    pub async fn run_when<T, E, F, Fut, P>(&self, op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&E) -> bool,
    {
        let mut attempt = 0u32;
        op.retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(retryable)
            .notify(|err: &E, delay: Duration| {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Attempt {attempt} failed, retrying"
                );
            })
            .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::with_settings(4, Duration::from_millis(1000));

        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_after_all_attempts() {
        let policy = RetryPolicy::with_settings(3, Duration::from_millis(1000));
        let start = Instant::now();
        let attempts = Mutex::new(Vec::new());

        let result: Result<(), String> = policy
            .run(|| {
                let mut attempts = attempts.lock().expect("lock");
                attempts.push(start.elapsed());
                let n = attempts.len();
                async move { Err(format!("failure {n}")) }
            })
            .await;

        assert_eq!(result, Err("failure 3".to_string()));
        let attempts = attempts.into_inner().expect("lock");
        assert_eq!(attempts, vec![Duration::ZERO, Duration::from_millis(1000), Duration::from_millis(3000)]);
        // No trailing wait after the final failure.
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_success() {
        let policy = RetryPolicy::with_settings(3, Duration::from_millis(10));
        let calls = Mutex::new(0u32);

        let result: Result<u32, String> = policy
            .run(|| {
                let mut calls = calls.lock().expect("lock");
                *calls += 1;
                let n = *calls;
                async move { if n < 2 { Err("not yet".to_string()) } else { Ok(n) } }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(*calls.lock().expect("lock"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::with_settings(3, Duration::from_millis(1000));
        let start = Instant::now();
        let calls = Mutex::new(0u32);

        let result: Result<(), String> = policy
            .run_when(
                || {
                    *calls.lock().expect("lock") += 1;
                    async { Err("fatal".to_string()) }
                },
                |e: &String| e != "fatal",
            )
            .await;

        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(*calls.lock().expect("lock"), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_sleeps() {
        let policy = RetryPolicy::with_settings(1, Duration::from_secs(3600));

        let result: Result<(), &str> = policy.run(|| async { Err("once") }).await;

        assert_eq!(result, Err("once"));
    }
}
