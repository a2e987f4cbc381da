//! Retry logic with capped exponential backoff.
//!
//! Attempt 1 runs immediately. Attempt `n >= 2` waits
//! `min(initial_delay * backoff_multiplier^(n-2), max_delay)`.
//! Every attempt first asks the group's [`CircuitBreaker`] for permission.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::ApiError;

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    /// Delay to wait before `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped.round() as u64)
    }

    /// Delays for every attempt of a call that keeps failing.
    pub fn delays(&self) -> Vec<Duration> {
        (1..=self.attempts())
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    ///
    /// The breaker is consulted before every attempt. When it refuses, the
    /// call fails with [`ApiError::CircuitOpen`] without running `operation`.
    /// Retryable failures count against the breaker; a non-retryable answer
    /// from the remote counts as a healthy response.
    pub async fn execute<T, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        mut operation: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;

        loop {
            let delay = self.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if !breaker.allow_request() {
                debug!(group = breaker.group(), attempt, "circuit open, not attempting");
                return Err(ApiError::circuit_open(breaker.group()));
            }

            match operation(attempt).await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(error) if error.is_retryable() => {
                    breaker.record_failure();
                    if attempt >= max_attempts {
                        warn!(
                            group = breaker.group(),
                            attempts = attempt,
                            error = %error,
                            "retries exhausted"
                        );
                        return Err(error);
                    }

                    let next_delay = self.delay_for_attempt(attempt + 1);
                    warn!(
                        group = breaker.group(),
                        attempt,
                        delay_ms = next_delay.as_millis() as u64,
                        error = %error,
                        "retryable failure, backing off"
                    );
                    attempt += 1;
                }
                Err(error) => {
                    breaker.record_success();
                    debug!(group = breaker.group(), attempt, error = %error, "terminal failure");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn tolerant_breaker_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 100,
            reset_timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn default_delays_match_documented_schedule() {
        let config = RetryConfig::default();

        assert_eq!(
            config.delays(),
            vec![
                Duration::ZERO,
                Duration::from_millis(1_000),
                Duration::from_millis(2_000)
            ]
        );
    }

    #[test]
    fn delays_are_capped_at_max_delay() {
        let config = RetryConfig {
            max_attempts: 7,
            ..RetryConfig::default()
        };

        let delays = config.delays();
        assert_eq!(delays[4], Duration::from_millis(8_000));
        assert_eq!(delays[5], Duration::from_millis(10_000));
        assert_eq!(delays[6], Duration::from_millis(10_000));
        assert!(delays.iter().all(|delay| *delay <= config.max_delay));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(config.delays(), vec![Duration::ZERO]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_server_errors_until_exhausted() {
        let breaker = CircuitBreaker::new("users", tolerant_breaker_config());
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), ApiError> = RetryConfig::default()
            .execute(&breaker, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::http(503, "busy")) }
            })
            .await;

        assert_eq!(result, Err(ApiError::http(503, "busy")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3_000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3_100), "elapsed {elapsed:?}");
        assert_eq!(breaker.consecutive_failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_fast() {
        let breaker = CircuitBreaker::new("users", tolerant_breaker_config());
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = RetryConfig::default()
            .execute(&breaker, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::http(422, "invalid")) }
            })
            .await;

        assert_eq!(result.map_err(|e| e.status()), Err(Some(422)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_a_later_attempt_succeeds() {
        let breaker = CircuitBreaker::new("users", tolerant_breaker_config());

        let result = RetryConfig::default()
            .execute(&breaker, |attempt| async move {
                if attempt < 2 {
                    Err(ApiError::http(429, "slow down"))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_short_circuits_without_calling() {
        let breaker = CircuitBreaker::new(
            "contacts",
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
        );
        breaker.record_failure();
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = RetryConfig::default()
            .execute(&breaker, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result, Err(ApiError::circuit_open("contacts")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
