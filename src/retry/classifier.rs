//! Error taxonomy for the scrape path
//!
//! Upstream failures are tagged with a marker prefix (`SESSION_EXPIRED: ...`)
//! before they leave the scraper. Validation reasons are free text. Both are
//! classified here so there is a single vocabulary for scrape failures.

use std::fmt;

/// Category of a scrape failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The persisted browser session is no longer authenticated
    SessionExpired,

    /// Navigation or network-layer failure
    NetworkError,

    /// The browser profile or automation context is unusable
    ContextCorrupted,

    /// Anything we could not place
    Unknown,
}

/// Reason-text fragments that indicate the session needs a fresh login
const EXPIRED_HINTS: &[&str] = &[
    "directory not found",
    "directory empty",
    "redirected to login",
    "login page",
    "session expired",
    "not authenticated",
    "unauthorized",
];

/// Reason-text fragments that indicate a broken profile or browser context
const CORRUPTED_HINTS: &[&str] = &[
    "corrupt",
    "target closed",
    "browser has been closed",
    "context closed",
    "crashed",
    "failed to launch",
];

/// Reason-text fragments that indicate a network-layer problem
const NETWORK_HINTS: &[&str] = &[
    "timeout",
    "timed out",
    "net::",
    "connection refused",
    "connection reset",
    "dns",
    "network",
    "unreachable",
];

impl ErrorCategory {
    /// Marker prefix used when this category is rendered into an error message
    pub fn marker(&self) -> &'static str {
        match self {
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ContextCorrupted => "CONTEXT_CORRUPTED",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Classifies an error message or validation reason
    ///
    /// Marker prefixes win over free-text heuristics, so a message that was
    /// already tagged upstream keeps its category.
    pub fn classify(message: &str) -> Self {
        for category in [
            Self::SessionExpired,
            Self::NetworkError,
            Self::ContextCorrupted,
            Self::Unknown,
        ] {
            if message.contains(category.marker()) {
                return category;
            }
        }

        let lowered = message.to_lowercase();
        if EXPIRED_HINTS.iter().any(|hint| lowered.contains(hint)) {
            Self::SessionExpired
        } else if CORRUPTED_HINTS.iter().any(|hint| lowered.contains(hint)) {
            Self::ContextCorrupted
        } else if NETWORK_HINTS.iter().any(|hint| lowered.contains(hint)) {
            Self::NetworkError
        } else {
            Self::Unknown
        }
    }

    /// Returns true if this category requires human intervention
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::ContextCorrupted)
    }

    /// Returns true if a retry may succeed without intervention
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::Unknown)
    }

    /// Manual remedy to print for fatal categories
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::SessionExpired => Some(
                "Log in again to refresh the persisted browser session \
                 (re-run the interactive login and save the session cookie into the profile directory)",
            ),
            Self::ContextCorrupted => Some(
                "Delete the browser profile directory and log in again to recreate it",
            ),
            Self::NetworkError | Self::Unknown => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}
