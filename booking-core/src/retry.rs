//! Bounded retry with linear backoff that races a cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `max_attempts` counts every invocation, including the first.
///
/// The wait after attempt `n` (1-based) is `n × backoff_unit`, so the default
/// policy waits 1s then 2s around its three attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// The token fired before the wait elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> Result<(), Interrupted> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { last: E, attempts: u32 },
    /// A non-retryable error stopped the loop early.
    Aborted { error: E, attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Runs `op` until it succeeds, returns a non-retryable error, runs out of
/// attempts, or `cancel` fires. `op` receives the 1-based attempt number.
pub async fn retry_cancellable<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut is_retryable: P,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let max = policy.attempts();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled { attempts: attempt };
        }
        attempt += 1;

        let error = match op(attempt).await {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts: attempt },
            Err(error) => error,
        };

        if !is_retryable(&error) {
            return RetryOutcome::Aborted { error, attempts: attempt };
        }
        if attempt >= max {
            return RetryOutcome::Exhausted { last: error, attempts: attempt };
        }
        if sleep_or_cancel(cancel, policy.delay_after(attempt)).await.is_err() {
            return RetryOutcome::Cancelled { attempts: attempt };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_op_runs_max_attempts_and_waits_three_seconds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let outcome: RetryOutcome<(), &str> = retry_cancellable(
            &RetryPolicy::default(),
            &CancellationToken::new(),
            |_| true,
            |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { last: "boom", attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_immediately() {
        let outcome: RetryOutcome<u32, &str> = retry_cancellable(
            &RetryPolicy::default(),
            &CancellationToken::new(),
            |_| true,
            |attempt| async move { if attempt < 2 { Err("transient") } else { Ok(attempt) } },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Succeeded { value: 2, attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_aborts_first_time() {
        let started = Instant::now();
        let outcome: RetryOutcome<(), &str> = retry_cancellable(
            &RetryPolicy::default(),
            &CancellationToken::new(),
            |e| *e != "permanent",
            |_| async { Err("permanent") },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Aborted { attempts: 1, .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_without_finishing_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome: RetryOutcome<(), &str> =
            retry_cancellable(&RetryPolicy::default(), &cancel, |_| true, |_| async { Err("down") }).await;

        assert!(matches!(outcome, RetryOutcome::Cancelled { attempts: 2 }));
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        let outcome: RetryOutcome<(), &str> =
            retry_cancellable(&policy, &CancellationToken::new(), |_| true, |_| async { Err("x") }).await;
        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 1, .. }));
    }
}
