//! Usage-Keeper: a resilient scraper for console usage data
//!
//! This crate drives an authenticated browser session against a usage page,
//! extracts per-window usage figures, keeps an immutable version history of
//! every snapshot on disk, and ships snapshots to a remote endpoint. Failures
//! are classified, retried with backoff and gated by a circuit breaker.

pub mod browser;
pub mod config;
pub mod orchestrator;
pub mod retry;
pub mod scraper;
pub mod session;
pub mod storage;
pub mod sync;
pub mod usage;

use thiserror::Error;

/// Main error type for Usage-Keeper operations
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Scrape(#[from] crate::scraper::ScrapeError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Sync error: {0}")]
    Sync(#[from] sync::SyncError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Usage-Keeper operations
pub type Result<T> = std::result::Result<T, UsageError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{CycleOutcome, Orchestrator};
pub use retry::{CircuitBreaker, CircuitState, ErrorCategory, RetryStrategy};
pub use crate::scraper::{ScrapeError, Scraper};
pub use session::SessionValidator;
pub use storage::VersionedStorage;
pub use sync::SyncClient;
pub use usage::{UsageSnapshot, ValidationResult, WindowUsage};
