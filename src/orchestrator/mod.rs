//! Orchestrator module for the auto-scrape loop
//!
//! This module contains the top-level scheduling logic, including:
//! - The interval-driven scrape loop with graceful shutdown
//! - Circuit breaker gating and backoff retries
//! - Persistence and sync of each successful snapshot
//! - Periodic profile cache maintenance

mod coordinator;
mod scheduler;

pub use coordinator::{CycleOutcome, Orchestrator, RunExit};
pub use scheduler::{maintenance_due, MaintenanceReason, RetryTimer};
