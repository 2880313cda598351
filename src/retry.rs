//! Retry with exponential backoff for transient upstream failures.
//!
//! `RetryState` is the per-call state machine: it counts attempts and decides,
//! after each failure, whether to try again and how long to wait first.
//! `run_with_retry` drives it, bounding every attempt with a timeout and
//! abandoning both attempts and backoff sleeps on cancellation.

use crate::config::RetrySettings;
use crate::error::{AcquisitionError, SummarizeFailure};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many times to try a call and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    /// Backoff before the retry that follows failed attempt `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make another attempt.
    Retry { delay: Duration },
    /// Stop and report the last failure.
    GiveUp,
}

/// Attempt counter for a single call.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Begin the next attempt and return its 1-based number.
    pub fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Decide what follows a failure of the current attempt.
    pub fn after_failure(&self, transient: bool) -> RetryDecision {
        if transient && self.attempt < self.policy.max_attempts {
            RetryDecision::Retry {
                delay: self.policy.delay_for(self.attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Errors that can be classified for retrying.
pub trait Retryable: Sized {
    fn is_transient(&self) -> bool;

    /// The error reported when an attempt exceeds its time limit.
    fn timed_out(limit: Duration) -> Self;
}

impl Retryable for AcquisitionError {
    fn is_transient(&self) -> bool {
        AcquisitionError::is_transient(self)
    }

    fn timed_out(limit: Duration) -> Self {
        AcquisitionError::Transient(format!("no response within {}s", limit.as_secs_f32()))
    }
}

impl Retryable for SummarizeFailure {
    fn is_transient(&self) -> bool {
        SummarizeFailure::is_transient(self)
    }

    fn timed_out(limit: Duration) -> Self {
        SummarizeFailure::Transient(format!("no response within {}s", limit.as_secs_f32()))
    }
}

/// Why a retried call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempted<E> {
    /// The last attempt failed and no retry was allowed.
    Failed { error: E, attempts: u32 },
    /// The cancellation token fired.
    Cancelled,
}

/// Run `op` until it succeeds, fails permanently, exhausts the policy or is cancelled.
///
/// `op` receives the 1-based attempt number. Each attempt is limited to
/// `timeout`; a timed-out attempt counts as a transient failure.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, Attempted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut state = policy.start();

    loop {
        let attempt = state.next_attempt();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Attempted::Cancelled),
            result = tokio::time::timeout(timeout, op(attempt)) => {
                result.unwrap_or_else(|_| Err(E::timed_out(timeout)))
            }
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match state.after_failure(error.is_transient()) {
            RetryDecision::Retry { delay } => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Attempt failed, retrying");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Attempted::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::GiveUp => {
                debug!(attempt, error = %error, "Giving up");
                return Err(Attempted::Failed {
                    error,
                    attempts: attempt,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(500), Duration::from_millis(800))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(500), Duration::from_secs(16));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(6), Duration::from_secs(16));
        assert_eq!(policy.delay_for(40), Duration::from_secs(16));
    }

    #[test]
    fn test_state_machine_decisions() {
        let mut state = policy().start();

        assert_eq!(state.next_attempt(), 1);
        assert_eq!(
            state.after_failure(true),
            RetryDecision::Retry { delay: Duration::from_millis(500) }
        );
        assert_eq!(state.after_failure(false), RetryDecision::GiveUp);

        assert_eq!(state.next_attempt(), 2);
        assert_eq!(
            state.after_failure(true),
            RetryDecision::Retry { delay: Duration::from_millis(800) }
        );

        assert_eq!(state.next_attempt(), 3);
        assert_eq!(state.after_failure(true), RetryDecision::GiveUp);
        assert_eq!(state.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result = run_with_retry(&policy(), Duration::from_secs(5), &CancellationToken::new(), |attempt| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(SummarizeFailure::Transient("503".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms then 800ms (capped) of backoff
        assert_eq!(started.elapsed(), Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> =
            run_with_retry(&policy(), Duration::from_secs(5), &CancellationToken::new(), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SummarizeFailure::PolicyRejected("content filter".into()))
                }
            })
            .await;

        assert_eq!(
            result,
            Err(Attempted::Failed {
                error: SummarizeFailure::PolicyRejected("content filter".into()),
                attempts: 1
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_transient() {
        let result: Result<(), _> = run_with_retry(
            &policy(),
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), AcquisitionError>(())
            },
        )
        .await;

        match result {
            Err(Attempted::Failed { error, attempts }) => {
                assert!(error.is_transient());
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let slow_policy = RetryPolicy::new(5, Duration::from_secs(30), Duration::from_secs(30));
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = run_with_retry(&slow_policy, Duration::from_secs(5), &cancel, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AcquisitionError::Transient("429".into()))
            }
        })
        .await;

        assert_eq!(result, Err(Attempted::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
