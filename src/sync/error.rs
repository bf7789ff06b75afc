//! Sync failure taxonomy
//!
//! Kept separate from the scrape-side categories: only sync failures carry
//! an HTTP status code.

use std::fmt;
use thiserror::Error;

/// Category of a failed sync call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCategory {
    /// Timeout, abort or connection-level failure
    Network,
    /// Endpoint rejected the API key (401)
    Auth,
    /// Endpoint rejected the payload (400)
    Validation,
    /// Endpoint failed (5xx)
    Server,
    /// Anything else, including malformed acknowledgements
    Unknown,
}

impl SyncCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Auth => "AUTH",
            Self::Validation => "VALIDATION",
            Self::Server => "SERVER",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Auth and validation failures will not change on a retry
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth | Self::Validation)
    }

    /// Classifies an HTTP status that was not a success
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Auth,
            400 => Self::Validation,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed sync attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}{}: {message}", status_suffix(.status_code))]
pub struct SyncError {
    pub category: SyncCategory,
    pub status_code: Option<u16>,
    pub message: String,
}

impl SyncError {
    pub fn new(category: SyncCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            category: SyncCategory::from_status(status),
            status_code: Some(status),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(status) => format!(" ({})", status),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(SyncCategory::from_status(401), SyncCategory::Auth);
        assert_eq!(SyncCategory::from_status(400), SyncCategory::Validation);
        assert_eq!(SyncCategory::from_status(500), SyncCategory::Server);
        assert_eq!(SyncCategory::from_status(503), SyncCategory::Server);
        assert_eq!(SyncCategory::from_status(404), SyncCategory::Unknown);
        assert_eq!(SyncCategory::from_status(429), SyncCategory::Unknown);
    }

    #[test]
    fn test_retryable_categories() {
        assert!(!SyncCategory::Auth.is_retryable());
        assert!(!SyncCategory::Validation.is_retryable());
        assert!(SyncCategory::Network.is_retryable());
        assert!(SyncCategory::Server.is_retryable());
        assert!(SyncCategory::Unknown.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = SyncError::with_status(503, "unavailable");
        assert_eq!(err.to_string(), "SERVER (503): unavailable");
        let err = SyncError::new(SyncCategory::Network, "timed out");
        assert_eq!(err.to_string(), "NETWORK: timed out");
    }

    #[test]
    fn test_converts_into_crate_error() {
        let wrapped: crate::UsageError = SyncError::with_status(401, "bad key").into();
        assert_eq!(wrapped.to_string(), "Sync error: AUTH (401): bad key");
    }
}
