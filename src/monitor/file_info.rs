//! Per-entry filesystem metadata.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Metadata for one filesystem entry at a point in time.
///
/// Identity is the path: equality, ordering, and hashing consider the path
/// only. The diff engine compares timestamps and sizes explicitly through
/// [`FileInfo::metadata_differs`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    path: PathBuf,
    is_dir: bool,
    mtime_ms: u64,
    size: u64,
}

impl FileInfo {
    /// Create a `FileInfo` from known metadata.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, is_dir: bool, mtime_ms: u64, size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir,
            mtime_ms,
            size,
        }
    }

    /// Read metadata for `path` from the filesystem.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if metadata cannot be read.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = path.symlink_metadata()?;
        Ok(Self::from_metadata(path, &meta))
    }

    /// Build a `FileInfo` from already-fetched metadata.
    #[must_use]
    pub fn from_metadata(path: &Path, meta: &std::fs::Metadata) -> Self {
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

        Self {
            path: path.to_path_buf(),
            is_dir: meta.is_dir(),
            mtime_ms,
            size: meta.len(),
        }
    }

    /// Absolute path of the entry.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component as UTF-8, if representable.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Last-modified time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn mtime_ms(&self) -> u64 {
        self.mtime_ms
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last-modified time as a `SystemTime`.
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_millis(self.mtime_ms)
    }

    /// Whether metadata differs from `other`.
    ///
    /// Used by the diff engine to classify an entry present in both
    /// snapshots as modified. Directory timestamps churn with every child
    /// operation, so two directories only differ if one stopped being a
    /// directory.
    #[must_use]
    pub fn metadata_differs(&self, other: &Self) -> bool {
        if self.is_dir != other.is_dir {
            return true;
        }
        if self.is_dir {
            return false;
        }
        self.mtime_ms != other.mtime_ms || self.size != other.size
    }
}

impl PartialEq for FileInfo {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileInfo {}

impl PartialOrd for FileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl std::hash::Hash for FileInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
