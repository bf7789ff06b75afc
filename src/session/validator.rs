//! Session validator
//!
//! Checks whether the persisted browser profile is still authenticated:
//! 1. Fail fast when the profile directory is missing or empty
//! 2. Launch a session and navigate to the usage page (bounded)
//! 3. Race "authenticated marker visible" against "redirected to login"
//! 4. If neither resolves, inspect the current URL for the login pattern
//!
//! The session is closed on every exit path. The validator only detects;
//! remediation is left to the caller.

use crate::browser::{BrowserError, BrowserLauncher, BrowserSession};
use crate::config::SessionConfig;
use crate::retry::ErrorCategory;
use crate::usage::ValidationResult;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Which wait settled first while checking authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthSignal {
    Authenticated,
    LoginRedirect,
    Undetermined,
}

/// Validates the persisted browser session
#[derive(Clone)]
pub struct SessionValidator {
    launcher: Arc<dyn BrowserLauncher>,
    config: SessionConfig,
}

impl SessionValidator {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: SessionConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.navigation_timeout_secs)
    }

    /// Validates the session, annotating a suggested action when `attempt_recovery` is set
    pub async fn validate(&self, attempt_recovery: bool) -> ValidationResult {
        let result = self.check().await;

        if result.valid {
            tracing::debug!("Session is valid");
            return result;
        }

        let reason = result.reason.clone().unwrap_or_default();
        tracing::warn!(reason = %reason, "Session validation failed");

        if attempt_recovery {
            let action = match ErrorCategory::classify(&reason) {
                ErrorCategory::SessionExpired => "manual_login_required",
                ErrorCategory::ContextCorrupted => "recreate_profile",
                ErrorCategory::NetworkError => "retry_later",
                ErrorCategory::Unknown => "none",
            };
            result.with_recovery(action)
        } else {
            result
        }
    }

    async fn check(&self) -> ValidationResult {
        let profile_dir = Path::new(&self.config.profile_dir);

        if let Some(reason) = profile_problem(profile_dir).await {
            return ValidationResult::invalid(reason);
        }

        let session = match self.launcher.launch(profile_dir).await {
            Ok(session) => session,
            Err(e) => {
                return ValidationResult::invalid(format!(
                    "{}: {}",
                    ErrorCategory::ContextCorrupted.marker(),
                    e
                ))
            }
        };

        let outcome = self.check_in_session(session.as_ref()).await;

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close validation session: {}", e);
        }

        outcome
    }

    async fn check_in_session(&self, session: &dyn BrowserSession) -> ValidationResult {
        let timeout = self.navigation_timeout();

        if let Err(e) = session.navigate(&self.config.usage_url, timeout).await {
            return ValidationResult::invalid(navigation_reason(&e));
        }

        let signal = tokio::select! {
            res = session.wait_for_text(&self.config.authenticated_marker, timeout) => {
                if res.is_ok() { AuthSignal::Authenticated } else { AuthSignal::Undetermined }
            }
            res = session.wait_for_url(&self.config.login_url_pattern, timeout) => {
                if res.is_ok() { AuthSignal::LoginRedirect } else { AuthSignal::Undetermined }
            }
        };

        match signal {
            AuthSignal::Authenticated => ValidationResult::valid(),
            AuthSignal::LoginRedirect => ValidationResult::invalid(format!(
                "Redirected to login page ({})",
                session.current_url().await
            )),
            AuthSignal::Undetermined => {
                let url = session.current_url().await;
                if url.contains(&self.config.login_url_pattern) {
                    ValidationResult::invalid(format!("Redirected to login page ({})", url))
                } else {
                    tracing::debug!(
                        url = %url,
                        "Authenticated marker not seen but no login redirect, treating session as valid"
                    );
                    ValidationResult::valid()
                }
            }
        }
    }
}

/// Describes why the profile directory cannot hold a session, if it cannot
async fn profile_problem(profile_dir: &Path) -> Option<String> {
    match tokio::fs::read_dir(profile_dir).await {
        Ok(mut entries) => match entries.next_entry().await {
            Ok(Some(_)) => None,
            Ok(None) => Some(format!(
                "Session directory empty: {}",
                profile_dir.display()
            )),
            Err(e) => Some(format!(
                "{}: cannot read session directory {}: {}",
                ErrorCategory::ContextCorrupted.marker(),
                profile_dir.display(),
                e
            )),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(format!(
            "Session directory not found: {}",
            profile_dir.display()
        )),
        Err(e) => Some(format!(
            "{}: cannot open session directory {}: {}",
            ErrorCategory::ContextCorrupted.marker(),
            profile_dir.display(),
            e
        )),
    }
}

fn navigation_reason(e: &BrowserError) -> String {
    format!(
        "{}: failed to load usage page: {}",
        ErrorCategory::NetworkError.marker(),
        e
    )
}
