//! Usage snapshot and session validation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of sections a complete snapshot carries
pub const TOTAL_SECTIONS: usize = 3;

/// Usage of a single rate-limit window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowUsage {
    /// Human-readable time until the window resets (e.g. "2 hr 15 min")
    pub resets_in: String,

    /// Percentage of the window consumed (0-100)
    pub percentage_used: f64,
}

/// Weekly windows; each is absent when its section failed to extract
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_models: Option<WindowUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sonnet_only: Option<WindowUsage>,
}

impl WeeklyLimits {
    pub fn is_complete(&self) -> bool {
        self.all_models.is_some() && self.sonnet_only.is_some()
    }
}

/// The scraped usage artifact
///
/// Built once per scrape attempt and never mutated afterwards; storage and
/// sync only ever borrow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_session: Option<WindowUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_limits: Option<WeeklyLimits>,

    /// Assembly time of the snapshot
    pub last_updated: DateTime<Utc>,

    /// True iff fewer than all sections were extracted
    pub is_partial: bool,

    /// Section name -> failure message, present iff any section failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_errors: Option<BTreeMap<String, String>>,
}

impl UsageSnapshot {
    /// Number of sections that made it into this snapshot
    pub fn sections_extracted(&self) -> usize {
        let weekly = self
            .weekly_limits
            .as_ref()
            .map(|w| w.all_models.is_some() as usize + w.sonnet_only.is_some() as usize)
            .unwrap_or(0);
        self.current_session.is_some() as usize + weekly
    }
}

/// The three independently extracted sections of the usage page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    CurrentSession,
    AllModels,
    SonnetOnly,
}

impl Section {
    pub const ALL: [Section; TOTAL_SECTIONS] =
        [Section::CurrentSession, Section::AllModels, Section::SonnetOnly];

    /// Key used in `extractionErrors`
    pub fn key(&self) -> &'static str {
        match self {
            Self::CurrentSession => "currentSession",
            Self::AllModels => "allModels",
            Self::SonnetOnly => "sonnetOnly",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Collects per-section outcomes and assembles a snapshot
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    current_session: Option<WindowUsage>,
    all_models: Option<WindowUsage>,
    sonnet_only: Option<WindowUsage>,
    errors: BTreeMap<String, String>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successfully extracted section
    pub fn section(&mut self, section: Section, usage: WindowUsage) -> &mut Self {
        match section {
            Section::CurrentSession => self.current_session = Some(usage),
            Section::AllModels => self.all_models = Some(usage),
            Section::SonnetOnly => self.sonnet_only = Some(usage),
        }
        self
    }

    /// Records a section that failed to extract
    pub fn failure(&mut self, section: Section, message: impl Into<String>) -> &mut Self {
        self.errors.insert(section.key().to_string(), message.into());
        self
    }

    pub fn sections_extracted(&self) -> usize {
        [&self.current_session, &self.all_models, &self.sonnet_only]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Assembles the snapshot, or returns None when nothing was extracted
    pub fn build(self, now: DateTime<Utc>) -> Option<UsageSnapshot> {
        let extracted = self.sections_extracted();
        if extracted == 0 {
            return None;
        }

        let weekly_limits = if self.all_models.is_some() || self.sonnet_only.is_some() {
            Some(WeeklyLimits {
                all_models: self.all_models,
                sonnet_only: self.sonnet_only,
            })
        } else {
            None
        };

        Some(UsageSnapshot {
            current_session: self.current_session,
            weekly_limits,
            last_updated: now,
            is_partial: extracted < TOTAL_SECTIONS,
            extraction_errors: if self.errors.is_empty() {
                None
            } else {
                Some(self.errors)
            },
        })
    }
}

/// Action taken while validating with recovery enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub action: String,
}

/// Outcome of a session validation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_result: Option<RecoveryResult>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            timestamp: Utc::now(),
            recovery_result: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            timestamp: Utc::now(),
            recovery_result: None,
        }
    }

    pub fn with_recovery(mut self, action: impl Into<String>) -> Self {
        self.recovery_result = Some(RecoveryResult {
            action: action.into(),
        });
        self
    }
}
