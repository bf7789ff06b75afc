//! Storage error types and I/O failure classification
//!
//! Write failures are split into transient ones (worth an immediate retry)
//! and permanent ones that need someone to fix the disk or permissions.

use std::fmt;
use std::io;
use thiserror::Error;

/// What is wrong with the storage location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageIssue {
    DiskFull,
    PermissionDenied,
    ReadOnly,
    MissingDirectory,
    Busy,
    Other,
}

impl StorageIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiskFull => "disk full",
            Self::PermissionDenied => "permission denied",
            Self::ReadOnly => "read-only filesystem",
            Self::MissingDirectory => "missing directory",
            Self::Busy => "resource busy",
            Self::Other => "unknown",
        }
    }
}

impl fmt::Display for StorageIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retry classification of a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteErrorKind {
    /// Likely to succeed if retried right away
    Transient,
    /// Will not succeed without external intervention
    Permanent(StorageIssue),
}

impl WriteErrorKind {
    /// The storage issue this failure points at
    pub fn issue(&self) -> StorageIssue {
        match self {
            Self::Transient => StorageIssue::Busy,
            Self::Permanent(issue) => *issue,
        }
    }
}

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage health check failed ({issue}): {message}")]
    HealthCheck { issue: StorageIssue, message: String },

    #[error("non-retryable write failure ({issue}): {message}")]
    Permanent { issue: StorageIssue, message: String },

    #[error("write failed after {attempts} attempts, retries exhausted: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Classifies a raw OS error code
#[cfg(unix)]
fn classify_errno(code: i32) -> Option<WriteErrorKind> {
    match code {
        libc::EINTR | libc::EAGAIN | libc::EBUSY | libc::ETXTBSY => Some(WriteErrorKind::Transient),
        libc::ENOSPC | libc::EDQUOT => Some(WriteErrorKind::Permanent(StorageIssue::DiskFull)),
        libc::EROFS => Some(WriteErrorKind::Permanent(StorageIssue::ReadOnly)),
        libc::EACCES | libc::EPERM => Some(WriteErrorKind::Permanent(StorageIssue::PermissionDenied)),
        libc::ENOENT | libc::ENOTDIR => {
            Some(WriteErrorKind::Permanent(StorageIssue::MissingDirectory))
        }
        _ => None,
    }
}

#[cfg(not(unix))]
fn classify_errno(_code: i32) -> Option<WriteErrorKind> {
    None
}

/// Classifies an I/O error as transient or permanent
pub fn classify_io_error(error: &io::Error) -> WriteErrorKind {
    if let Some(kind) = error.raw_os_error().and_then(classify_errno) {
        return kind;
    }

    match error.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            return WriteErrorKind::Transient
        }
        io::ErrorKind::PermissionDenied => {
            return WriteErrorKind::Permanent(StorageIssue::PermissionDenied)
        }
        io::ErrorKind::NotFound => {
            return WriteErrorKind::Permanent(StorageIssue::MissingDirectory)
        }
        _ => {}
    }

    let message = error.to_string().to_lowercase();
    if message.contains("busy")
        || message.contains("try again")
        || message.contains("temporarily unavailable")
    {
        WriteErrorKind::Transient
    } else if message.contains("no space") || message.contains("quota") {
        WriteErrorKind::Permanent(StorageIssue::DiskFull)
    } else if message.contains("read-only") {
        WriteErrorKind::Permanent(StorageIssue::ReadOnly)
    } else {
        WriteErrorKind::Permanent(StorageIssue::Other)
    }
}
