//! HTTP client for the remote sync endpoint

use super::error::{SyncCategory, SyncError};
use crate::config::SyncConfig;
use crate::usage::{UsageSnapshot, WeeklyLimits, WindowUsage};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "X-API-Key";

/// Acknowledgement returned by the endpoint on success
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncAck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Wire body: the snapshot without its extraction errors
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    current_session: Option<&'a WindowUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weekly_limits: Option<&'a WeeklyLimits>,
    last_updated: DateTime<Utc>,
    is_partial: bool,
}

impl<'a> From<&'a UsageSnapshot> for SyncPayload<'a> {
    fn from(snapshot: &'a UsageSnapshot) -> Self {
        Self {
            current_session: snapshot.current_session.as_ref(),
            weekly_limits: snapshot.weekly_limits.as_ref(),
            last_updated: snapshot.last_updated,
            is_partial: snapshot.is_partial,
        }
    }
}

/// Error body shape used by the endpoint for rejected payloads
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Pushes snapshots to the sync endpoint
#[derive(Debug, Clone)]
pub struct SyncClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    retry_delays: Vec<Duration>,
    max_attempts: u32,
}

impl SyncClient {
    /// Builds a client from the `[sync]` section
    ///
    /// # Returns
    ///
    /// * `Ok(SyncClient)` - Ready to send
    /// * `Err(SyncError)` - The HTTP client could not be built
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .user_agent(concat!("usage-keeper/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SyncError::new(
                    SyncCategory::Unknown,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout,
            retry_delays: config
                .retry_delays_secs
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// Overrides the retry ladder
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Delay before the retry that follows `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let last = self.retry_delays.len().saturating_sub(1);
        let index = (attempt.saturating_sub(1) as usize).min(last);
        self.retry_delays
            .get(index)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Sends one snapshot, single attempt
    ///
    /// # Returns
    ///
    /// * `Ok(SyncAck)` - 2xx with a positive acknowledgement
    /// * `Err(SyncError)` - Classified failure
    pub async fn sync_snapshot(&self, snapshot: &UsageSnapshot) -> Result<SyncAck, SyncError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&SyncPayload::from(snapshot))
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            let ack: SyncAck = response.json().await.map_err(|e| SyncError {
                category: SyncCategory::Unknown,
                status_code: Some(status.as_u16()),
                message: format!("malformed acknowledgement: {}", e),
            })?;
            if !ack.success {
                return Err(SyncError {
                    category: SyncCategory::Unknown,
                    status_code: Some(status.as_u16()),
                    message: format!("endpoint reported failure: {}", ack.message),
                });
            }
            return Ok(ack);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SyncError::with_status(
            status.as_u16(),
            describe_failure(status, &body),
        ))
    }

    /// Sends one snapshot, retrying retryable failures on the fixed ladder
    pub async fn sync_with_retry(&self, snapshot: &UsageSnapshot) -> Result<SyncAck, SyncError> {
        let mut attempt = 1;
        loop {
            match self.sync_snapshot(snapshot).await {
                Ok(ack) => {
                    tracing::info!(attempt, "Snapshot synced: {}", ack.message);
                    return Ok(ack);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!("Sync rejected, not retrying: {}", e);
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    tracing::error!("Sync failed after {} attempts: {}", attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Sync attempt {}/{} failed, retrying in {:?}: {}",
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn classify_transport_error(&self, error: reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::new(
                SyncCategory::Network,
                format!("request timed out after {:?}", self.timeout),
            )
        } else if error.is_builder() {
            SyncError::new(SyncCategory::Unknown, error.to_string())
        } else {
            SyncError::new(SyncCategory::Network, error.to_string())
        }
    }
}

/// Builds a readable message for a non-2xx response
fn describe_failure(status: StatusCode, body: &str) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "API key rejected".to_string(),
        StatusCode::BAD_REQUEST => serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    "payload rejected".to_string()
                } else {
                    body.trim().to_string()
                }
            }),
        _ => format!("unexpected status {}", status),
    }
}
