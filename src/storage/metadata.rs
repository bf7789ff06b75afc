//! Bookkeeping for the version directory

use super::error::StorageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the metadata file inside the storage directory
pub const METADATA_FILE: &str = "_metadata.json";

/// Summary of the version history, persisted next to the versions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetadata {
    pub version_count: usize,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
    pub last_cleanup: Option<DateTime<Utc>>,
    pub total_versions_created: u64,
    pub total_versions_deleted: u64,
}

impl StorageMetadata {
    /// Loads metadata from `dir`, falling back to defaults when absent or unreadable
    pub async fn load(dir: &Path) -> Self {
        let path = dir.join(METADATA_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Writes metadata to `dir`
    pub async fn save(&self, dir: &Path) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(dir.join(METADATA_FILE), json).await?;
        Ok(())
    }

    /// Refreshes the derived fields from the current version timestamps
    ///
    /// `timestamps` must be sorted newest first.
    pub fn refresh(&mut self, timestamps: &[DateTime<Utc>]) {
        self.version_count = timestamps.len();
        self.newest_timestamp = timestamps.first().copied();
        self.oldest_timestamp = timestamps.last().copied();
    }
}
