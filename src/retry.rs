//! Bounded retries inside a hard wall-clock deadline.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Classify, ErrorKind};

/// Exponential-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
        }
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        // Saturates instead of overflowing on long retry chains
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds, fails with a non-retryable kind, or
    /// `max_attempts` retryable failures have been seen. The last error is
    /// returned in the latter two cases.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        retryable: &[ErrorKind],
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !retryable.contains(&e.kind()) => {
                    debug!("{} failed with non-retryable error: {}", label, e);
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        attempt,
                        "{} failed after {} attempts: {}", label, self.max_attempts, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        attempt,
                        "Attempt {}/{} failed for {}: {}. Retrying in {:.1}s",
                        attempt,
                        self.max_attempts,
                        label,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Result of racing an operation against a deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deadline<T, R> {
    Completed(T),
    /// The operation was abandoned; carries the timeout callback's return value.
    Expired(R),
}

impl<T, R> Deadline<T, R> {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// Race `fut` against `deadline`. On expiry the future is dropped and
/// `on_timeout` runs before this returns.
pub async fn with_deadline<T, R, Fut, C>(
    fut: Fut,
    deadline: Duration,
    label: &str,
    on_timeout: C,
) -> Deadline<T, R>
where
    Fut: Future<Output = T>,
    C: FnOnce() -> R,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(value) => Deadline::Completed(value),
        Err(_) => {
            warn!("TIMEOUT: {} after {:.0}s", label, deadline.as_secs_f64());
            Deadline::Expired(on_timeout())
        }
    }
}

/// Message recorded for an entity abandoned by its deadline.
pub fn timeout_message(deadline: Duration) -> String {
    format!("Timeout after {}s", deadline.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutomationError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, 2.0)
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_saturates_on_long_chains() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(65), Duration::MAX);
        assert_eq!(policy.delay_after(u32::MAX), Duration::MAX);

        let flat = RetryPolicy::new(100, Duration::from_secs(1), 1.0);
        assert_eq!(flat.delay_after(100), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retryable_error_invokes_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AutomationError> = fast(4)
            .run("op", ErrorKind::TRANSIENT, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AutomationError::Timeout("slow".into()))
            })
            .await;

        assert!(matches!(result, Err(AutomationError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AutomationError> = fast(3)
            .run("op", ErrorKind::TRANSIENT, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AutomationError::NotFound("menu".into()))
            })
            .await;

        assert!(matches!(result, Err(AutomationError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run("op", ErrorKind::TRANSIENT, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AutomationError::Navigation {
                        url: "u".into(),
                        reason: "reset".into(),
                    })
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadline_abandons_stuck_operation() {
        let fired = AtomicU32::new(0);
        let start = Instant::now();

        let outcome = with_deadline(
            std::future::pending::<()>(),
            Duration::from_millis(100),
            "stuck",
            || fired.fetch_add(1, Ordering::SeqCst),
        )
        .await;

        let elapsed = start.elapsed();
        assert!(outcome.is_expired());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_completed_value() {
        let outcome: Deadline<u8, ()> =
            with_deadline(async { 5 }, Duration::from_secs(1), "quick", || ()).await;
        assert_eq!(outcome, Deadline::Completed(5));
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(timeout_message(Duration::from_secs(20)), "Timeout after 20s");
    }
}
