//! Timing primitives for the scrape loop
//!
//! This module handles:
//! - The single-slot backoff retry timer
//! - Deciding when profile cache maintenance is due

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// A cancellable, single-slot deadline for the next backoff retry
///
/// Arming replaces any pending deadline, so at most one retry is ever
/// scheduled.
#[derive(Debug, Default)]
pub struct RetryTimer {
    deadline: Option<Instant>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a retry `delay` from now, replacing any pending one
    pub fn arm(&mut self, delay: Duration) {
        self.arm_at(Instant::now() + delay);
    }

    pub fn arm_at(&mut self, deadline: Instant) {
        if self.deadline.is_some() {
            tracing::debug!("Replacing pending retry timer");
        }
        self.deadline = Some(deadline);
    }

    /// Drops the pending retry, if any
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves when the pending retry is due; never resolves when disarmed
    pub async fn fired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}

/// Why a maintenance pass was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceReason {
    /// Every N-th run
    RunCount(u64),
    /// Cache size (bytes) crossed the threshold
    CacheSize(u64),
}

impl fmt::Display for MaintenanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunCount(run) => write!(f, "scheduled at run {}", run),
            Self::CacheSize(bytes) => {
                write!(f, "cache size {:.1} MB", *bytes as f64 / (1024.0 * 1024.0))
            }
        }
    }
}

/// Decides whether maintenance should run on `run_count`
///
/// # Arguments
///
/// * `run_count` - 1-based number of the current cycle
/// * `every_runs` - Run-count modulus; 0 disables the count trigger
/// * `threshold_bytes` - Cache size trigger; 0 disables it
/// * `cache_size` - Measures the current cache size, only called when needed
pub fn maintenance_due(
    run_count: u64,
    every_runs: u64,
    threshold_bytes: u64,
    cache_size: impl FnOnce() -> u64,
) -> Option<MaintenanceReason> {
    if every_runs > 0 && run_count % every_runs == 0 {
        return Some(MaintenanceReason::RunCount(run_count));
    }

    if threshold_bytes == 0 {
        return None;
    }

    let size = cache_size();
    (size >= threshold_bytes).then_some(MaintenanceReason::CacheSize(size))
}
