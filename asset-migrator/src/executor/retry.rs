//! Bounded per-asset retry.

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of running an operation under a [`RetryController`]
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// First success, or the last failure
    pub result: Result<T>,

    /// How many times the operation ran
    pub attempts: u32,

    /// Failed attempts that were followed by another attempt
    pub retries: u32,
}

/// Runs an operation up to `max_attempts` times.
///
/// Retries are immediate unless a base delay is configured, in which case the
/// wait before retry `n` is `base_delay * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryController {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryController {
    /// Immediate retries; `max_attempts` below 1 is treated as 1
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Enable capped exponential backoff between attempts
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() || retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn attempt<T, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0u32;
        let mut retries = 0u32;

        loop {
            attempts += 1;
            let error = match op(attempts).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                        retries,
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() || attempts >= self.max_attempts {
                debug!(attempts, retries, error = %error, "Giving up");
                return RetryOutcome {
                    result: Err(error),
                    attempts,
                    retries,
                };
            }

            retries += 1;
            let delay = self.delay_for(retries);
            warn!(
                attempt = attempts,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MigrationError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> MigrationError {
        MigrationError::Server { status: 500 }
    }

    #[tokio::test]
    async fn test_first_attempt_success_consumes_no_retries() {
        let controller = RetryController::new(5);
        let outcome = controller.attempt(|_| async { Ok::<_, MigrationError>(7) }).await;

        assert_eq!(outcome.result.unwrap(), 7);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries, 0);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let controller = RetryController::new(5);
        let outcome = controller
            .attempt(|attempt| async move {
                if attempt < 3 {
                    Err(server_error())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.retries, 2);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_failure() {
        let calls = AtomicU32::new(0);
        let controller = RetryController::new(4);
        let outcome: RetryOutcome<()> = controller
            .attempt(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(MigrationError::Transport(format!("attempt {attempt}"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.attempts, 4);
        // The final failure is not followed by a retry
        assert_eq!(outcome.retries, 3);
        match outcome.result {
            Err(MigrationError::Transport(msg)) => assert_eq!(msg, "attempt 4"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let controller = RetryController::new(5);
        let outcome: RetryOutcome<()> = controller
            .attempt(|_| async { Err(MigrationError::UnsupportedFormat("x.bmp".into())) })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries, 0);
        assert!(matches!(outcome.result, Err(MigrationError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_zero_max_attempts_still_runs_once() {
        let controller = RetryController::new(0);
        let outcome: RetryOutcome<()> = controller.attempt(|_| async { Err(server_error()) }).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries, 0);
    }

    #[test]
    fn test_backoff_delays() {
        let immediate = RetryController::new(3);
        assert_eq!(immediate.delay_for(1), Duration::ZERO);

        let controller = RetryController::new(10)
            .with_backoff(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(controller.delay_for(1), Duration::from_millis(100));
        assert_eq!(controller.delay_for(2), Duration::from_millis(200));
        assert_eq!(controller.delay_for(3), Duration::from_millis(400));
        assert_eq!(controller.delay_for(4), Duration::from_millis(500));
        assert_eq!(controller.delay_for(40), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let controller = RetryController::new(3)
            .with_backoff(Duration::from_secs(1), Duration::from_secs(10));
        let start = tokio::time::Instant::now();

        let outcome: RetryOutcome<()> = controller.attempt(|_| async { Err(server_error()) }).await;

        assert_eq!(outcome.retries, 2);
        // 1s + 2s of (auto-advanced) sleep
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
