use std::future::Future;
use std::time::Duration;

use crate::SourceError;

/// Upper bound on any single backoff delay
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Rate-limit errors wait this many times longer than the computed delay
const RATE_LIMIT_MULTIPLIER: u32 = 4;

/// Parse errors are retried once; past that they are treated as a broken
/// source rather than a glitch
const MAX_PARSE_RETRIES: u32 = 1;

/// Bounded exponential-backoff executor wrapping a single source call.
///
/// Transient failures (network, timeout, rate limit) are retried up to the
/// attempt budget; a definitive `NoTranscriptAvailable` terminates
/// immediately because retrying cannot change a "no captions" answer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff_base: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_base,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before attempt `k` (1-based); the first attempt never waits.
    /// Follows `base * 2^(k-1)` capped at ten seconds.
    pub fn delay_before_attempt(&self, attempt: u32, rate_limited: bool) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(16);
        let mut delay = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(exponent));
        if rate_limited {
            delay = delay.saturating_mul(RATE_LIMIT_MULTIPLIER);
        }
        delay.min(BACKOFF_CAP)
    }

    /// Run `operation` until it succeeds or the retry budget is spent,
    /// returning the last error.
    pub async fn run<T, F, Fut>(
        &self,
        source_name: &str,
        mut operation: F,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut parse_failures = 0u32;
        let mut last_error: Option<SourceError> = None;

        for attempt in 1..=self.attempts {
            let rate_limited = matches!(last_error, Some(SourceError::RateLimited(_)));
            let delay = self.delay_before_attempt(attempt, rate_limited);
            if !delay.is_zero() {
                tracing::debug!(
                    source = source_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        source = source_name,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "source attempt failed"
                    );

                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if matches!(e, SourceError::Parse(_)) {
                        parse_failures += 1;
                        if parse_failures > MAX_PARSE_RETRIES {
                            tracing::warn!(
                                source = source_name,
                                "repeated malformed responses, giving up on source"
                            );
                            return Err(e);
                        }
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SourceError::Network("retry budget exhausted without an attempt".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_schedule_follows_capped_exponential() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500));

        assert_eq!(policy.delay_before_attempt(1, false), Duration::ZERO);
        assert_eq!(
            policy.delay_before_attempt(2, false),
            Duration::from_millis(1000)
        );
        assert_eq!(
            policy.delay_before_attempt(3, false),
            Duration::from_millis(2000)
        );
        assert_eq!(
            policy.delay_before_attempt(4, false),
            Duration::from_millis(4000)
        );
        // base * 2^5 = 16s, capped
        assert_eq!(policy.delay_before_attempt(6, false), BACKOFF_CAP);
    }

    #[test]
    fn test_rate_limited_delay_is_longer_but_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500));

        assert_eq!(
            policy.delay_before_attempt(2, true),
            Duration::from_millis(4000)
        );
        assert_eq!(policy.delay_before_attempt(4, true), BACKOFF_CAP);
    }

    #[tokio::test]
    async fn test_succeeds_on_nth_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(SourceError::Network("flaky".to_string()))
                } else {
                    Ok("transcript")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "transcript");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_definitive_failure_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::NoTranscriptAvailable("no captions".to_string()))
            })
            .await;

        assert!(matches!(
            result,
            Err(SourceError::NoTranscriptAvailable(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempts_on_timeout() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Timeout(50))
            })
            .await;

        assert!(matches!(result, Err(SourceError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_parse_error_retried_exactly_once() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Parse("garbage".to_string()))
            })
            .await;

        assert!(matches!(result, Err(SourceError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SourceError>(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
