//! Change events produced by the diff engine.

use serde::{Deserialize, Serialize};

use super::file_info::FileInfo;

/// Classification of one filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Entry appeared since the last snapshot.
    Added,
    /// Entry exists in both snapshots with different metadata.
    Modified,
    /// Entry disappeared since the last snapshot.
    Removed,
}

/// One reconciled change, consumed exactly once by delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// What happened to the entry.
    pub kind: ChangeKind,
    /// The entry's metadata: post-change for added/modified entries,
    /// last-recorded for removed entries.
    pub info: FileInfo,
}

impl FileChangeEvent {
    /// Create an added event.
    #[must_use]
    pub fn added(info: FileInfo) -> Self {
        Self {
            kind: ChangeKind::Added,
            info,
        }
    }

    /// Create a modified event.
    #[must_use]
    pub fn modified(info: FileInfo) -> Self {
        Self {
            kind: ChangeKind::Modified,
            info,
        }
    }

    /// Create a removed event.
    #[must_use]
    pub fn removed(info: FileInfo) -> Self {
        Self {
            kind: ChangeKind::Removed,
            info,
        }
    }

    /// Path of the affected entry.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.info.path()
    }
}
