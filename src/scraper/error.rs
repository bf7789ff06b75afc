use crate::retry::ErrorCategory;
use thiserror::Error;

/// A scrape failure tagged with its category
///
/// Renders as `MARKER: message`, e.g. `SESSION_EXPIRED: Redirected to login page`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {message}")]
pub struct ScrapeError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ScrapeError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Builds an error from an untagged or pre-tagged message
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            category: ErrorCategory::classify(&message),
            message,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category.is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_tagged() {
        let err = ScrapeError::new(ErrorCategory::ContextCorrupted, "profile unreadable");
        assert_eq!(err.to_string(), "CONTEXT_CORRUPTED: profile unreadable");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display_round_trips_through_classifier() {
        let err = ScrapeError::new(ErrorCategory::NetworkError, "dns lookup failed");
        assert_eq!(ScrapeError::from_message(err.to_string()).category, err.category);
    }

    #[test]
    fn test_converts_into_crate_error() {
        let err = ScrapeError::new(ErrorCategory::SessionExpired, "login required");
        let wrapped: crate::UsageError = err.into();
        assert_eq!(wrapped.to_string(), "SESSION_EXPIRED: login required");
        assert!(std::error::Error::source(&wrapped).is_some());
    }
}
