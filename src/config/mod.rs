//! Configuration module for Usage-Keeper
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so an empty file is a usable configuration.
//!
//! # Example
//!
//! ```no_run
//! use usage_keeper::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("usage-keeper.toml")).unwrap();
//! println!("History lives in: {}", config.storage.directory);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, RetryConfig, ScheduleConfig, ScraperConfig, SessionConfig, StorageConfig, SyncConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, SYNC_API_KEY_ENV,
};
