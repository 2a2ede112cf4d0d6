/// Retry scheduling with bounded exponential backoff
///
/// Wraps one logical backend call and re-runs it while the classifier says
/// the failure is retryable and the attempt budget lasts. Delays double per
/// attempt and are capped: 30 seconds while rate limited, 10 seconds for
/// every other retryable kind. Delays are deterministic (no jitter) so
/// callers can reason about worst-case gate latency.
use super::classification::{ErrorClassifier, ErrorKind};
use crate::{AuthResult, RetryPolicy, RATE_LIMIT_DELAY_CAP, STANDARD_DELAY_CAP};
use std::future::Future;
use std::time::Duration;

/// Delay cap for a retryable kind.
pub fn delay_cap(kind: ErrorKind) -> Duration {
    match kind {
        ErrorKind::RateLimit => RATE_LIMIT_DELAY_CAP,
        _ => STANDARD_DELAY_CAP,
    }
}

/// Per-call retry bookkeeping. Each `execute` owns its own context; nothing
/// is shared between concurrent calls.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// 1-based number of the attempt currently running (0 before the first).
    pub attempt: u32,

    /// Total attempt budget, counting the first try.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl RetryContext {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay,
        }
    }

    /// Whether another attempt fits in the budget.
    pub fn has_budget(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Delay to wait after the current attempt failed:
    /// `min(base * 2^(attempt-1), cap)`.
    pub fn next_delay(&self, kind: ErrorKind) -> Duration {
        let cap = delay_cap(kind);
        // Exponent clamped well past the point where any cap applies.
        let exp = self.attempt.saturating_sub(1).min(32);
        let exponential_ms = self.base_delay.as_millis() * 2_u128.pow(exp);
        let capped_ms = exponential_ms.min(cap.as_millis());

        Duration::from_millis(capped_ms as u64)
    }
}

/// Runs operations under a `RetryPolicy`, consulting the classifier after
/// every failure. Re-entrant: holds no mutable state across calls.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    classifier: ErrorClassifier,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// A failure the classifier marks non-retryable propagates immediately,
    /// regardless of remaining budget. On exhaustion the last error is
    /// returned. Waits between attempts are tokio sleep suspension points.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> AuthResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AuthResult<T>>,
    {
        let mut context = RetryContext::new(self.policy.max_attempts.max(1), self.policy.base_delay());

        loop {
            context.attempt += 1;

            match op().await {
                Ok(value) => {
                    if context.attempt > 1 {
                        tracing::info!(
                            operation,
                            attempt = context.attempt,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let info = self.classifier.classify(&error);

                    if !info.should_retry {
                        tracing::warn!(
                            operation,
                            attempt = context.attempt,
                            kind = %info.kind,
                            "failure is not retryable, giving up"
                        );
                        return Err(error);
                    }

                    if !context.has_budget() {
                        tracing::warn!(
                            operation,
                            attempts = context.attempt,
                            kind = %info.kind,
                            "retry budget exhausted"
                        );
                        return Err(error);
                    }

                    let delay = context.next_delay(info.kind);
                    tracing::warn!(
                        operation,
                        attempt = context.attempt,
                        kind = %info.kind,
                        backoff = %humantime::format_duration(delay),
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_per_attempt() {
        let mut context = RetryContext::new(10, Duration::from_millis(500));

        let expected = [500u64, 1000, 2000, 4000, 8000];
        for (i, want) in expected.iter().enumerate() {
            context.attempt = (i + 1) as u32;
            assert_eq!(
                context.next_delay(ErrorKind::Network).as_millis() as u64,
                *want,
                "attempt {} delay",
                i + 1
            );
        }
    }

    #[test]
    fn test_delay_caps_at_ten_seconds_standard() {
        let mut context = RetryContext::new(20, Duration::from_millis(500));

        // 500ms * 2^9 = 256s, far past the cap.
        context.attempt = 10;
        assert_eq!(context.next_delay(ErrorKind::Network), STANDARD_DELAY_CAP);
        assert_eq!(context.next_delay(ErrorKind::Server), STANDARD_DELAY_CAP);
        assert_eq!(context.next_delay(ErrorKind::Timeout), STANDARD_DELAY_CAP);
        assert_eq!(context.next_delay(ErrorKind::Unknown), STANDARD_DELAY_CAP);
    }

    #[test]
    fn test_rate_limit_gets_higher_cap() {
        let mut context = RetryContext::new(20, Duration::from_millis(500));

        context.attempt = 10;
        assert_eq!(context.next_delay(ErrorKind::RateLimit), RATE_LIMIT_DELAY_CAP);
    }

    #[test]
    fn test_delays_monotonic_and_capped() {
        let mut context = RetryContext::new(64, Duration::from_millis(250));

        let mut previous = Duration::ZERO;
        for attempt in 1..=64 {
            context.attempt = attempt;
            let delay = context.next_delay(ErrorKind::Network);
            assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            assert!(delay <= STANDARD_DELAY_CAP);
            previous = delay;
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let mut context = RetryContext::new(u32::MAX, Duration::from_secs(1));

        context.attempt = u32::MAX;
        assert_eq!(context.next_delay(ErrorKind::Network), STANDARD_DELAY_CAP);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_aborts_after_one_attempt() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);

        let result: AuthResult<()> = scheduler
            .execute("validate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AuthError::InvalidEntry("bad field".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Validation must not retry");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_exhausts_full_budget() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(4, Duration::from_millis(100)));
        let calls = AtomicU32::new(0);

        let result: AuthResult<()> = scheduler
            .execute("sync", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AuthError::Network("still down".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_on_exhaustion() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(3, Duration::from_millis(100)));
        let calls = AtomicU32::new(0);

        let result: AuthResult<()> = scheduler
            .execute("sync", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(AuthError::Network(format!("failure {}", n))) }
            })
            .await;

        assert_eq!(result, Err(AuthError::Network("failure 3".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_mid_budget() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(5, Duration::from_millis(100)));
        let calls = AtomicU32::new(0);

        let result = scheduler
            .execute("sync", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(AuthError::Timeout(format!("attempt {}", n)))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_consumes_expected_virtual_time() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(3, Duration::from_millis(500)));
        let started = tokio::time::Instant::now();

        let result: AuthResult<()> = scheduler
            .execute("sync", || async {
                Err(AuthError::Network("down".to_string()))
            })
            .await;

        assert!(result.is_err());
        // Two waits: 500ms then 1000ms. The paused clock advances exactly.
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_longer_than_standard() {
        let policy = RetryPolicy::new(2, Duration::from_secs(20));

        let scheduler = RetryScheduler::new(policy.clone());
        let started = tokio::time::Instant::now();
        let _: AuthResult<()> = scheduler
            .execute("standard", || async {
                Err(AuthError::Network("down".to_string()))
            })
            .await;
        // 20s base capped to the 10s standard cap.
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        let scheduler = RetryScheduler::new(policy);
        let started = tokio::time::Instant::now();
        let _: AuthResult<()> = scheduler
            .execute("limited", || async {
                Err(AuthError::Status {
                    code: 429,
                    message: "too many requests".to_string(),
                })
            })
            .await;
        // Same base under the 30s rate-limit cap stays uncapped.
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_still_runs_once() {
        let scheduler = RetryScheduler::new(RetryPolicy::new(0, Duration::from_millis(100)));
        let calls = AtomicU32::new(0);

        let result = scheduler
            .execute("noop", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7u32) }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
