//! Retry strategy for the scrape loop
//!
//! Computes exponential backoff with jitter, decides whether a failure is
//! worth retrying, and owns the circuit breaker. One instance lives for the
//! whole scrape loop and is threaded through the orchestrator explicitly.

use crate::config::RetryConfig;
use crate::retry::circuit::{CircuitBreaker, CircuitBreakerSettings, CircuitState};
use crate::retry::classifier::ErrorCategory;
use rand::Rng;
use std::time::{Duration, Instant};

/// Backoff and eligibility settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrySettings {
    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any computed delay
    pub max_delay: Duration,

    /// Maximum random jitter added to each delay, in seconds
    pub jitter_secs: f64,

    /// Attempts after which no further retry is scheduled
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            jitter_secs: 10.0,
            max_attempts: 5,
        }
    }
}

/// Retry bookkeeping for the long-lived scrape loop
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    settings: RetrySettings,
    attempt_count: u32,
    breaker: CircuitBreaker,
}

impl RetryStrategy {
    pub fn new(settings: RetrySettings, breaker_settings: CircuitBreakerSettings) -> Self {
        Self {
            settings,
            attempt_count: 0,
            breaker: CircuitBreaker::new(breaker_settings),
        }
    }

    /// Builds a strategy from the `[retry]` configuration section
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            RetrySettings {
                base_delay: Duration::from_millis(config.base_delay_ms),
                max_delay: Duration::from_millis(config.max_delay_ms),
                jitter_secs: config.jitter_secs,
                max_attempts: config.max_attempts,
            },
            CircuitBreakerSettings {
                failure_threshold: config.failure_threshold,
                success_threshold: config.success_threshold,
                open_duration: Duration::from_millis(config.open_duration_ms),
            },
        )
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Consecutive failed attempts since the last success
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Computes the backoff delay for a 1-based attempt number
    ///
    /// `min(base * 2^(n-1) + jitter, max)` where jitter is uniform in
    /// `[0, jitter_secs]` seconds.
    pub fn calculate_delay(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1).min(31);
        let base_ms = self.settings.base_delay.as_millis() as u64;
        let exponential_ms = base_ms.saturating_mul(1u64 << exponent);

        let jitter_ms = if self.settings.jitter_secs > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.0..=self.settings.jitter_secs);
            (jitter * 1000.0) as u64
        } else {
            0
        };

        let max_ms = self.settings.max_delay.as_millis() as u64;
        Duration::from_millis(exponential_ms.saturating_add(jitter_ms).min(max_ms))
    }

    /// Decides whether a failure of `category` on `attempt_number` should be retried
    ///
    /// Fatal categories are never retried. Checking the breaker may move it
    /// from OPEN to HALF_OPEN.
    pub fn should_retry(&mut self, category: ErrorCategory, attempt_number: u32) -> bool {
        self.should_retry_at(category, attempt_number, Instant::now())
    }

    pub fn should_retry_at(
        &mut self,
        category: ErrorCategory,
        attempt_number: u32,
        now: Instant,
    ) -> bool {
        if category.is_fatal() {
            return false;
        }

        if attempt_number >= self.settings.max_attempts {
            return false;
        }

        if self.breaker.is_open_at(now) {
            return false;
        }

        category.is_recoverable()
    }

    /// Returns true if the breaker currently rejects attempts
    pub fn is_circuit_open(&mut self) -> bool {
        self.breaker.is_open()
    }

    pub fn is_circuit_open_at(&mut self, now: Instant) -> bool {
        self.breaker.is_open_at(now)
    }

    /// Records a failed attempt and returns the new attempt count
    pub fn record_failure(&mut self) -> u32 {
        self.record_failure_at(Instant::now())
    }

    pub fn record_failure_at(&mut self, now: Instant) -> u32 {
        self.attempt_count += 1;
        self.breaker.record_failure_at(now);
        self.attempt_count
    }

    /// Records a successful attempt, clearing the attempt counter
    pub fn record_success(&mut self) {
        self.attempt_count = 0;
        self.breaker.record_success();
    }

    /// Clears the attempt counter without touching the breaker
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(RetrySettings::default(), CircuitBreakerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_bounds_for_each_attempt() {
        let strategy = RetryStrategy::default();

        for _ in 0..50 {
            let first = strategy.calculate_delay(1).as_millis();
            assert!((30_000..=40_000).contains(&first), "attempt 1: {}", first);

            let third = strategy.calculate_delay(3).as_millis();
            assert!((120_000..=130_000).contains(&third), "attempt 3: {}", third);
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let strategy = RetryStrategy::default();

        for attempt in [5, 6, 10, 40] {
            assert_eq!(strategy.calculate_delay(attempt), Duration::from_secs(300));
        }
    }

    #[test]
    fn test_delay_without_jitter_is_exact() {
        let strategy = RetryStrategy::new(
            RetrySettings {
                jitter_secs: 0.0,
                ..RetrySettings::default()
            },
            CircuitBreakerSettings::default(),
        );

        assert_eq!(strategy.calculate_delay(1), Duration::from_secs(30));
        assert_eq!(strategy.calculate_delay(2), Duration::from_secs(60));
        assert_eq!(strategy.calculate_delay(4), Duration::from_secs(240));
    }

    #[test]
    fn test_fatal_categories_never_retry() {
        let mut strategy = RetryStrategy::default();

        for attempt in 0..20 {
            assert!(!strategy.should_retry(ErrorCategory::SessionExpired, attempt));
            assert!(!strategy.should_retry(ErrorCategory::ContextCorrupted, attempt));
        }
    }

    #[test]
    fn test_recoverable_categories_retry_until_max() {
        let mut strategy = RetryStrategy::default();

        assert!(strategy.should_retry(ErrorCategory::NetworkError, 1));
        assert!(strategy.should_retry(ErrorCategory::Unknown, 4));
        assert!(!strategy.should_retry(ErrorCategory::NetworkError, 5));
        assert!(!strategy.should_retry(ErrorCategory::Unknown, 6));
    }

    #[test]
    fn test_open_circuit_blocks_retry() {
        let now = Instant::now();
        let mut strategy = RetryStrategy::default();

        for _ in 0..3 {
            strategy.record_failure_at(now);
        }

        assert_eq!(strategy.circuit_state(), CircuitState::Open);
        assert!(!strategy.should_retry_at(ErrorCategory::NetworkError, 1, now));
        assert!(strategy.should_retry_at(
            ErrorCategory::NetworkError,
            1,
            now + Duration::from_secs(60)
        ));
        assert_eq!(strategy.circuit_state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_success_resets_attempts() {
        let mut strategy = RetryStrategy::default();
        assert_eq!(strategy.record_failure(), 1);
        assert_eq!(strategy.record_failure(), 2);

        strategy.record_success();
        assert_eq!(strategy.attempt_count(), 0);
        assert_eq!(strategy.breaker().failure_count(), 0);
    }
}
