//! Bounded retry of read-then-assert checks.
//!
//! The poller knows nothing about LACP: it runs any check returning
//! [`VerifyResult`] until it passes, the attempt count is spent, or the
//! timeout budget would be overrun by another backoff interval.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{VerifyError, VerifyResult};

/// Default backoff floor.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Budget and diagnostics for one retried verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Orchestration step, e.g. "Verify LACP status on both devices".
    pub description: String,
    /// Message attached to the last failure when the budget runs out.
    pub failure_message: String,
    /// Maximum number of check invocations.
    pub max_attempts: u32,
    /// Total time budget.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(
        description: impl Into<String>,
        failure_message: impl Into<String>,
        max_attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            description: description.into(),
            failure_message: failure_message.into(),
            max_attempts,
            timeout,
        }
    }

    /// Sleep between attempts: the timeout spread over the attempts, never
    /// below `floor`.
    pub fn interval(&self, floor: Duration) -> Duration {
        (self.timeout / self.max_attempts.max(1)).max(floor)
    }
}

/// A passing check and what it took to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// Value returned by the passing check.
    pub value: T,
    /// Check invocations, including the passing one.
    pub attempts: u32,
    /// Time from the first invocation to success.
    pub elapsed: Duration,
}

/// Runs checks under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPoller {
    min_backoff: Duration,
}

impl RetryPoller {
    /// Creates a poller with the given backoff floor.
    pub const fn new(min_backoff: Duration) -> Self {
        Self { min_backoff }
    }

    /// Invokes `check` until it succeeds or the policy is exhausted.
    ///
    /// Errors that are not retryable (see [`VerifyError::is_retryable`]) are
    /// returned as-is on the attempt that produced them. Otherwise the final
    /// failure is wrapped in [`VerifyError::RetryExhausted`].
    pub async fn retry<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        mut check: F,
    ) -> VerifyResult<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VerifyResult<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let interval = policy.interval(self.min_backoff);
        let start = Instant::now();
        let mut attempts = 0;

        let last = loop {
            attempts += 1;
            debug!(
                step = %policy.description,
                attempt = attempts,
                max_attempts,
                "Running check"
            );

            let err = match check().await {
                Ok(value) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts,
                        elapsed: start.elapsed(),
                    })
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            warn!(
                step = %policy.description,
                attempt = attempts,
                error = %err,
                "{}",
                policy.failure_message
            );

            if attempts >= max_attempts || start.elapsed() + interval > policy.timeout {
                break err;
            }
            tokio::time::sleep(interval).await;
        };

        Err(VerifyError::RetryExhausted {
            description: policy.description.clone(),
            failure_message: policy.failure_message.clone(),
            attempts,
            elapsed: start.elapsed(),
            last: Box::new(last),
        })
    }
}

impl Default for RetryPoller {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Relation;
    use std::cell::Cell;

    fn skew(attempt: u32) -> VerifyError {
        VerifyError::mismatch("2", "key", Relation::SameLag, attempt.to_string(), "")
    }

    #[test]
    fn test_interval() {
        let policy = RetryPolicy::new("step", "not yet", 5, Duration::from_secs(15));
        assert_eq!(policy.interval(DEFAULT_MIN_BACKOFF), Duration::from_secs(3));

        let tight = RetryPolicy::new("step", "not yet", 100, Duration::from_secs(1));
        assert_eq!(tight.interval(DEFAULT_MIN_BACKOFF), DEFAULT_MIN_BACKOFF);

        let zero = RetryPolicy::new("step", "not yet", 0, Duration::from_secs(4));
        assert_eq!(zero.interval(DEFAULT_MIN_BACKOFF), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_stops() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new("step", "not yet", 5, Duration::from_secs(15));

        let outcome = RetryPoller::default()
            .retry(&policy, || {
                calls.set(calls.get() + 1);
                async { Ok::<_, VerifyError>("converged") }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "converged");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new("step", "not yet", 5, Duration::from_secs(15));

        let outcome = RetryPoller::default()
            .retry(&policy, || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt < 5 {
                        Err(skew(attempt))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 5);
        assert_eq!(calls.get(), 5);
        assert_eq!(outcome.elapsed, Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_wraps_last_failure() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(
            "Verify LACP status on both devices",
            "Configuration not yet applied",
            2,
            Duration::from_secs(4),
        );

        let err = RetryPoller::default()
            .retry(&policy, || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move { Err::<(), _>(skew(attempt)) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 2);
        match &err {
            VerifyError::RetryExhausted {
                description,
                failure_message,
                attempts,
                ..
            } => {
                assert_eq!(description, "Verify LACP status on both devices");
                assert_eq!(failure_message, "Configuration not yet applied");
                assert_eq!(*attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.field_mismatch().unwrap().a, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new("step", "not yet", 5, Duration::from_secs(15));

        let err = RetryPoller::default()
            .retry(&policy, || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(VerifyError::device_command("sw1", "lacp mode", "denied")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, VerifyError::DeviceCommand { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_attempts() {
        let calls = Cell::new(0);
        // Each check takes 1s, so the 5s budget ends polling before
        // the attempt limit.
        let policy = RetryPolicy::new("step", "not yet", 10, Duration::from_secs(5));

        let err = RetryPoller::new(Duration::from_millis(100))
            .retry(&policy, || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Err::<(), _>(skew(attempt))
                }
            })
            .await
            .unwrap_err();

        let VerifyError::RetryExhausted {
            attempts, elapsed, ..
        } = err
        else {
            panic!("expected RetryExhausted");
        };
        assert_eq!(attempts, 4);
        assert_eq!(attempts, calls.get());
        assert!(elapsed <= Duration::from_secs(5) + policy.interval(Duration::from_millis(100)));
    }
}
