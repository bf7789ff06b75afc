//! Storage module for persisting usage snapshots
//!
//! This module handles durable history on the local filesystem, including:
//! - Immutable, timestamp-named version files
//! - A `latest` pointer mirroring the newest version
//! - Running counters in `_metadata.json`
//! - Health-checked writes that retry only transient failures
//! - Retention cleanup bounded by age and count

mod error;
mod metadata;
mod naming;
mod versioned;

pub use error::{classify_io_error, StorageError, StorageIssue, StorageResult, WriteErrorKind};
pub use metadata::{StorageMetadata, METADATA_FILE};
pub use naming::{generate_version_filename, parse_timestamp_from_filename};
pub use versioned::{
    CleanupReport, StorageHealth, VersionFile, VersionedStorage, WRITE_ATTEMPTS,
    WRITE_RETRY_DELAYS,
};
