//! Retry module for scrape-level failure handling
//!
//! This module contains:
//! - The scrape error taxonomy and its classifier
//! - A lazily-transitioning circuit breaker
//! - The exponential backoff retry strategy that owns the breaker

mod circuit;
mod classifier;
mod strategy;

pub use circuit::{CircuitBreaker, CircuitBreakerSettings, CircuitState};
pub use classifier::ErrorCategory;
pub use strategy::{RetrySettings, RetryStrategy};
