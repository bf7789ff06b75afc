//! Versioned snapshot storage
//!
//! Every successful save produces a new immutable file in the storage
//! directory. A `latest` pointer mirrors the most recent content and
//! `_metadata.json` keeps running counters. Old versions are removed by
//! [`VersionedStorage::cleanup_old_versions`].

use super::error::{classify_io_error, StorageError, StorageIssue, StorageResult, WriteErrorKind};
use super::metadata::StorageMetadata;
use super::naming::{generate_version_filename, parse_timestamp_from_filename};
use crate::config::StorageConfig;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Write attempts per save
pub const WRITE_ATTEMPTS: u32 = 3;

/// Delay before each retry of a transient write failure
pub const WRITE_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(200),
    Duration::from_millis(400),
];

const PROBE_FILE: &str = ".write-probe";
const DEFAULT_LATEST_FILE: &str = "latest.json";

/// Result of a storage write probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHealth {
    pub writable: bool,
    pub issue: Option<StorageIssue>,
    pub message: String,
}

impl StorageHealth {
    fn healthy() -> Self {
        Self {
            writable: true,
            issue: None,
            message: "storage is writable".to_string(),
        }
    }

    fn failed(issue: StorageIssue, message: String) -> Self {
        Self {
            writable: false,
            issue: Some(issue),
            message,
        }
    }
}

/// One version file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFile {
    pub filename: String,
    pub filepath: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Timestamped, append-only snapshot storage with retention
#[derive(Debug, Clone)]
pub struct VersionedStorage {
    dir: PathBuf,
    latest_path: PathBuf,
    retention_days: u32,
    max_versions: usize,
}

impl VersionedStorage {
    /// Opens storage rooted at `config.directory`, creating it if needed
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let dir = PathBuf::from(&config.directory);
        let latest_path = config
            .latest_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| dir.join(DEFAULT_LATEST_FILE));

        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            latest_path,
            retention_days: config.retention_days,
            max_versions: config.max_versions,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> &Path {
        &self.latest_path
    }

    /// Probes the storage directory with a write, read and delete
    ///
    /// # Returns
    ///
    /// A [`StorageHealth`] naming the issue (disk full, permissions,
    /// read-only filesystem, missing directory) when the probe fails.
    pub async fn can_write_to_storage(&self) -> StorageHealth {
        if !self.dir.is_dir() {
            return StorageHealth::failed(
                StorageIssue::MissingDirectory,
                format!("storage directory {} does not exist", self.dir.display()),
            );
        }

        let probe = self.dir.join(PROBE_FILE);
        let payload = Utc::now().to_rfc3339();

        let result = async {
            tokio::fs::write(&probe, payload.as_bytes()).await?;
            let read_back = tokio::fs::read_to_string(&probe).await?;
            tokio::fs::remove_file(&probe).await?;
            if read_back != payload {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "probe file content did not match what was written",
                ));
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => StorageHealth::healthy(),
            Err(e) => {
                let _ = tokio::fs::remove_file(&probe).await;
                let issue = classify_io_error(&e).issue();
                StorageHealth::failed(issue, format!("{}: {}", issue, e))
            }
        }
    }

    /// Persists `data` as a new version
    ///
    /// Runs the health probe once, then writes the version with up to
    /// [`WRITE_ATTEMPTS`] attempts for transient failures. The latest
    /// pointer and metadata are updated afterwards on a best-effort basis.
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Path of the new version file
    /// * `Err(StorageError)` - Health check failure, permanent failure or exhausted retries
    pub async fn save_version<T: Serialize + ?Sized>(&self, data: &T) -> StorageResult<PathBuf> {
        let health = self.can_write_to_storage().await;
        if !health.writable {
            return Err(StorageError::HealthCheck {
                issue: health.issue.unwrap_or(StorageIssue::Other),
                message: health.message,
            });
        }

        let json = serde_json::to_vec_pretty(data)?;
        let path = retry_transient(WRITE_ATTEMPTS, || self.write_new_version(&json)).await?;
        tracing::info!("Saved version {}", path.display());

        if let Err(e) = self.write_latest(&json).await {
            tracing::warn!(
                "Failed to update latest pointer {}: {}",
                self.latest_path.display(),
                e
            );
        }

        if let Err(e) = self.record_save().await {
            tracing::warn!("Failed to update storage metadata: {}", e);
        }

        Ok(path)
    }

    async fn write_new_version(&self, json: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(generate_version_filename(Utc::now()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let written = match file.write_all(json).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        drop(file);

        discard_on_error(&path, written).await?;
        Ok(path)
    }

    async fn write_latest(&self, json: &[u8]) -> io::Result<()> {
        let mut tmp = self.latest_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.latest_path).await
    }

    async fn record_save(&self) -> StorageResult<()> {
        let mut metadata = StorageMetadata::load(&self.dir).await;
        let timestamps = self.version_timestamps().await?;
        metadata.total_versions_created += 1;
        metadata.refresh(&timestamps);
        metadata.save(&self.dir).await
    }

    async fn version_timestamps(&self) -> StorageResult<Vec<DateTime<Utc>>> {
        Ok(self
            .scan_versions()
            .await?
            .into_iter()
            .map(|v| v.timestamp)
            .collect())
    }

    /// Lists version files, newest first
    ///
    /// Files whose names do not carry a version timestamp are skipped.
    pub async fn scan_versions(&self) -> StorageResult<Vec<VersionFile>> {
        let mut versions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if let Some(timestamp) = parse_timestamp_from_filename(&filename) {
                versions.push(VersionFile {
                    filepath: entry.path(),
                    filename,
                    timestamp,
                });
            }
        }

        // Names sort lexically in timestamp order
        versions.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(versions)
    }

    /// Paths of stored versions, newest first, optionally capped at `limit`
    pub async fn list_versions(&self, limit: Option<usize>) -> StorageResult<Vec<PathBuf>> {
        let versions = self.scan_versions().await?;
        Ok(versions
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|v| v.filepath)
            .collect())
    }

    pub async fn cleanup_old_versions(&self) -> StorageResult<CleanupReport> {
        self.cleanup_old_versions_at(Utc::now()).await
    }

    /// Applies retention as of `now`
    ///
    /// Keeps every version inside the retention window and at least the
    /// newest `max_versions`, whichever is more. Individual delete failures
    /// are logged and counted, never fatal.
    pub async fn cleanup_old_versions_at(&self, now: DateTime<Utc>) -> StorageResult<CleanupReport> {
        let versions = self.scan_versions().await?;
        let total = versions.len();
        let cutoff = now - chrono::Duration::days(i64::from(self.retention_days));

        let in_window = versions.iter().filter(|v| v.timestamp > cutoff).count();
        let keep = in_window.max(self.max_versions.min(total));

        let mut report = CleanupReport {
            kept: keep,
            ..CleanupReport::default()
        };

        for version in versions.iter().skip(keep) {
            match tokio::fs::remove_file(&version.filepath).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", version.filename, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            total,
            in_window,
            kept = report.kept,
            deleted = report.deleted,
            failed = report.failed,
            "Retention cleanup finished"
        );

        let mut metadata = StorageMetadata::load(&self.dir).await;
        metadata.total_versions_deleted += report.deleted as u64;
        metadata.last_cleanup = Some(now);
        match self.version_timestamps().await {
            Ok(timestamps) => metadata.refresh(&timestamps),
            Err(e) => tracing::warn!("Failed to rescan versions after cleanup: {}", e),
        }
        if let Err(e) = metadata.save(&self.dir).await {
            tracing::warn!("Failed to update storage metadata: {}", e);
        }

        Ok(report)
    }

    /// Reads the latest pointer, if one has been written
    pub async fn load_latest<T: DeserializeOwned>(&self) -> StorageResult<Option<T>> {
        match tokio::fs::read(&self.latest_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads one version file
    pub async fn load_version<T: DeserializeOwned>(&self, path: &Path) -> StorageResult<T> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn metadata(&self) -> StorageMetadata {
        StorageMetadata::load(&self.dir).await
    }
}

/// Removes a version file whose write did not complete
///
/// A retry writes under a fresh name, so a truncated file would otherwise
/// be listed as a version.
async fn discard_on_error(path: &Path, result: io::Result<()>) -> io::Result<()> {
    if let Err(e) = result {
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            tracing::warn!(
                "Failed to remove incomplete version {}: {}",
                path.display(),
                remove_err
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Runs `op` until it succeeds, retrying only transient I/O failures
async fn retry_transient<T, F, Fut>(attempts: u32, mut op: F) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut attempt = 1;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match classify_io_error(&error) {
            WriteErrorKind::Permanent(issue) => {
                tracing::error!("Write failed with non-retryable error ({}): {}", issue, error);
                return Err(StorageError::Permanent {
                    issue,
                    message: error.to_string(),
                });
            }
            WriteErrorKind::Transient if attempt >= attempts => {
                tracing::error!("Write failed after {} attempts: {}", attempts, error);
                return Err(StorageError::RetriesExhausted {
                    attempts,
                    message: error.to_string(),
                });
            }
            WriteErrorKind::Transient => {
                let index = (attempt as usize - 1).min(WRITE_RETRY_DELAYS.len() - 1);
                let delay = WRITE_RETRY_DELAYS[index];
                tracing::warn!(
                    "Transient write failure (attempt {}/{}), retrying in {:?}: {}",
                    attempt,
                    attempts,
                    delay,
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
