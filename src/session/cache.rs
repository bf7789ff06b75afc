//! Browser profile cache maintenance
//!
//! Long-running profiles accumulate HTTP, code and shader caches. These are
//! safe to delete; cookies and local storage live elsewhere in the profile
//! and are never touched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Cache subdirectories relative to the profile root
pub const CACHE_DIRS: &[&str] = &[
    "Cache",
    "Code Cache",
    "GPUCache",
    "ShaderCache",
    "GrShaderCache",
    "Default/Cache",
    "Default/Code Cache",
    "Default/GPUCache",
    "Default/Service Worker/CacheStorage",
];

/// Result of a cache cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheCleanupReport {
    /// Cache directories that were removed
    pub removed: Vec<PathBuf>,

    /// Bytes freed across removed directories
    pub freed_bytes: u64,

    /// Directories that could not be removed, with the error
    pub failed: Vec<(PathBuf, String)>,
}

/// Measures and clears the cache folders of a browser profile
#[derive(Debug, Clone)]
pub struct CacheMaintainer {
    profile_dir: PathBuf,
}

impl CacheMaintainer {
    pub fn new(profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_dir: profile_dir.into(),
        }
    }

    fn cache_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        CACHE_DIRS
            .iter()
            .map(|relative| self.profile_dir.join(relative))
            .filter(|path| path.is_dir())
    }

    /// Total size of all cache directories in bytes
    pub fn cache_size_bytes(&self) -> u64 {
        self.cache_paths()
            .map(|path| dir_size(&path).unwrap_or(0))
            .sum()
    }

    /// Removes every cache directory, continuing past individual failures
    pub fn clear_caches(&self) -> CacheCleanupReport {
        let mut report = CacheCleanupReport::default();

        for path in self.cache_paths().collect::<Vec<_>>() {
            let size = dir_size(&path).unwrap_or(0);
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::debug!("Removed cache directory {}", path.display());
                    report.freed_bytes += size;
                    report.removed.push(path);
                }
                Err(e) => {
                    tracing::warn!("Failed to remove cache directory {}: {}", path.display(), e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        report
    }
}

/// Recursive size of a directory; symlinks are not followed
fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
