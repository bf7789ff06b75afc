//! Browser automation capability
//!
//! The scraper and session validator never talk to a browser engine directly.
//! They go through these two traits, which lets the retry, circuit breaker and
//! storage logic be exercised with [`testing::ScriptedBrowser`].
//!
//! - `BrowserLauncher`: opens a session against a persistent profile directory
//! - `BrowserSession`: navigation, waits, section extraction and release
//! - `HttpBrowser`: a cookie-replaying HTTP implementation

mod http;
pub mod testing;

pub use http::{HttpBrowser, HttpSession};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a browser capability
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out after {}s waiting for {what}", .after.as_secs())]
    Timeout { what: String, after: Duration },

    #[error("section not found: {0}")]
    SectionNotFound(String),

    #[error("browser session already closed")]
    Closed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens browser sessions bound to a persistent profile
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launches a headless session using `profile_dir` as its persistent profile
    async fn launch(&self, profile_dir: &Path) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// A live browser session
///
/// Callers must call [`BrowserSession::close`] on every exit path.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Loads `url`, failing if it does not settle within `timeout`
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Resolves once `text` is visible on the page
    async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Resolves once the current URL contains `pattern`
    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// URL the session currently shows
    async fn current_url(&self) -> String;

    /// Waits for the section located by `selector_hint` and returns its visible text
    async fn extract_section(
        &self,
        selector_hint: &str,
        timeout: Duration,
    ) -> Result<String, BrowserError>;

    /// Releases the underlying browser resources
    async fn close(&self) -> Result<(), BrowserError>;
}
