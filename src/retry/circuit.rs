//! Circuit breaker state machine
//!
//! The breaker is checked, not polled: the OPEN -> HALF_OPEN transition
//! happens lazily inside [`CircuitBreaker::is_open_at`] once the open duration
//! has elapsed, so no background timer is needed.
//!
//! ```text
//! CLOSED --(failure_threshold failures)--> OPEN
//! OPEN --(open_duration elapsed, on query)--> HALF_OPEN
//! HALF_OPEN --(success_threshold successes)--> CLOSED
//! HALF_OPEN --(any failure)--> OPEN
//! ```

use std::fmt;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,

    /// Calls are rejected until the open duration elapses
    Open,

    /// Probe calls are allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholds controlling breaker transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures in CLOSED before opening
    pub failure_threshold: u32,

    /// Consecutive successes in HALF_OPEN before closing
    pub success_threshold: u32,

    /// How long the breaker stays OPEN before allowing a probe
    pub open_duration: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            open_duration: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker guarding the scrape loop
///
/// Invariant: `state == Open` implies `opened_at.is_some()`.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    settings: CircuitBreakerSettings,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Creates a breaker in the CLOSED state
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            settings,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    pub fn settings(&self) -> &CircuitBreakerSettings {
        &self.settings
    }

    /// Returns true if calls should currently be rejected
    pub fn is_open(&mut self) -> bool {
        self.is_open_at(Instant::now())
    }

    /// Returns true if calls should be rejected at `now`
    ///
    /// When the breaker is OPEN and the open duration has elapsed, this call
    /// moves it to HALF_OPEN and returns false.
    pub fn is_open_at(&mut self, now: Instant) -> bool {
        if self.state != CircuitState::Open {
            return false;
        }

        let elapsed = self
            .opened_at
            .map(|opened| now.saturating_duration_since(opened))
            .unwrap_or(Duration::MAX);

        if elapsed >= self.settings.open_duration {
            tracing::info!(
                elapsed_secs = elapsed.as_secs(),
                "Circuit breaker entering HALF_OPEN, allowing a probe attempt"
            );
            self.state = CircuitState::HalfOpen;
            self.success_count = 0;
            false
        } else {
            true
        }
    }

    /// Time left until an OPEN breaker allows a probe, if it is OPEN
    pub fn remaining_open_time_at(&self, now: Instant) -> Option<Duration> {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened)) => Some(
                self.settings
                    .open_duration
                    .saturating_sub(now.saturating_duration_since(opened)),
            ),
            _ => None,
        }
    }

    /// Records a successful call
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.settings.success_threshold {
                    tracing::info!("Circuit breaker CLOSED after successful probes");
                    self.reset();
                }
            }
            CircuitState::Open => {
                // Successes are only counted once a probe has been let through
            }
        }
    }

    /// Records a failed call
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    /// Records a failed call observed at `now`
    pub fn record_failure_at(&mut self, now: Instant) {
        self.failure_count += 1;

        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.settings.failure_threshold {
                    tracing::warn!(
                        failures = self.failure_count,
                        open_secs = self.settings.open_duration.as_secs(),
                        "Circuit breaker OPEN"
                    );
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("Probe failed, circuit breaker back to OPEN");
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Returns the breaker to CLOSED and clears all counters
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.opened_at = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerSettings::default())
    }
}
