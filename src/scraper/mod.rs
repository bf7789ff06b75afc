//! Scraper module
//!
//! Turns a validated browser session into a [`UsageSnapshot`]:
//! - Session validation with at most one recovery pass for expired sessions
//! - Independent per-section extraction; one section failing never aborts the rest
//! - Partial snapshots are a success, only zero extracted sections is an error
//! - The extraction session is released on every exit path

mod error;

pub use error::ScrapeError;

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::config::{ScraperConfig, SessionConfig};
use crate::retry::ErrorCategory;
use crate::session::SessionValidator;
use crate::usage::{parse_window_usage, Section, SnapshotBuilder, UsageSnapshot};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Scrapes usage snapshots through a browser capability
#[derive(Clone)]
pub struct Scraper {
    launcher: Arc<dyn BrowserLauncher>,
    validator: SessionValidator,
    session: SessionConfig,
    config: ScraperConfig,
}

impl Scraper {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        session: SessionConfig,
        config: ScraperConfig,
    ) -> Self {
        let validator = SessionValidator::new(Arc::clone(&launcher), session.clone());
        Self {
            launcher,
            validator,
            session,
            config,
        }
    }

    pub fn validator(&self) -> &SessionValidator {
        &self.validator
    }

    fn label(&self, section: Section) -> &str {
        match section {
            Section::CurrentSession => &self.config.current_session_label,
            Section::AllModels => &self.config.all_models_label,
            Section::SonnetOnly => &self.config.sonnet_only_label,
        }
    }

    /// Runs one scrape attempt
    ///
    /// # Returns
    ///
    /// * `Ok(UsageSnapshot)` - At least one section was extracted
    /// * `Err(ScrapeError)` - The session could not be used or nothing was extracted
    pub async fn scrape(&self) -> Result<UsageSnapshot, ScrapeError> {
        self.ensure_session().await?;

        let profile_dir = Path::new(&self.session.profile_dir);
        let session = self.launcher.launch(profile_dir).await.map_err(|e| {
            ScrapeError::new(
                ErrorCategory::ContextCorrupted,
                format!("could not launch browser for extraction: {}", e),
            )
        })?;

        let outcome = self.extract(session.as_ref()).await;

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close extraction session: {}", e);
        }

        outcome
    }

    /// Validates the session, trying one recovery pass when it looks expired
    async fn ensure_session(&self) -> Result<(), ScrapeError> {
        let validation = self.validator.validate(false).await;
        if validation.valid {
            return Ok(());
        }

        let reason = validation
            .reason
            .unwrap_or_else(|| "session invalid".to_string());
        let category = ErrorCategory::classify(&reason);

        match category {
            ErrorCategory::SessionExpired => {
                tracing::info!("Session looks expired, attempting one recovery validation");
                let recovery = self.validator.validate(true).await;
                if recovery.valid {
                    tracing::info!("Session recovered on second validation");
                    return Ok(());
                }
                let remedy = category
                    .remediation()
                    .unwrap_or("log in again to refresh the session");
                Err(ScrapeError::new(
                    category,
                    format!("{}. Manual action required: {}", strip_marker(&reason), remedy),
                ))
            }
            _ => Err(ScrapeError::new(category, strip_marker(&reason))),
        }
    }

    async fn extract(&self, session: &dyn BrowserSession) -> Result<UsageSnapshot, ScrapeError> {
        let nav_timeout = Duration::from_secs(self.session.navigation_timeout_secs);
        session
            .navigate(&self.session.usage_url, nav_timeout)
            .await
            .map_err(|e| {
                ScrapeError::new(
                    ErrorCategory::NetworkError,
                    format!("failed to load usage page: {}", e),
                )
            })?;

        let section_timeout = Duration::from_secs(self.config.section_timeout_secs);
        let mut builder = SnapshotBuilder::new();

        for section in Section::ALL {
            let label = self.label(section);
            let parsed = match session.extract_section(label, section_timeout).await {
                Ok(text) => parse_window_usage(&text),
                Err(e) => Err(e.to_string()),
            };

            match parsed {
                Ok(usage) => {
                    tracing::debug!(
                        section = %section,
                        percentage = usage.percentage_used,
                        "Extracted section"
                    );
                    builder.section(section, usage);
                }
                Err(message) => {
                    tracing::warn!(section = %section, error = %message, "Section extraction failed");
                    builder.failure(section, message);
                }
            }
        }

        let extracted = builder.sections_extracted();
        let errors = builder.errors().clone();

        match builder.build(Utc::now()) {
            Some(snapshot) => {
                tracing::info!(
                    sections = extracted,
                    partial = snapshot.is_partial,
                    "Usage snapshot assembled"
                );
                Ok(snapshot)
            }
            None => Err(ScrapeError::new(
                ErrorCategory::Unknown,
                format!(
                    "no usage sections could be extracted ({})",
                    errors
                        .iter()
                        .map(|(section, error)| format!("{}: {}", section, error))
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
            )),
        }
    }
}

/// Drops a leading `MARKER: ` so messages are not double-tagged
fn strip_marker(reason: &str) -> String {
    for category in [
        ErrorCategory::SessionExpired,
        ErrorCategory::NetworkError,
        ErrorCategory::ContextCorrupted,
        ErrorCategory::Unknown,
    ] {
        if let Some(rest) = reason.strip_prefix(category.marker()) {
            return rest.trim_start_matches(':').trim().to_string();
        }
    }
    reason.to_string()
}
