//! Filtered directory scanning.
//!
//! Builds the initial snapshot tree at registration time and the targeted
//! rescans the diff engine reconciles raw notifications against. Rejected
//! directories are pruned, so their subtrees are never descended into.

use std::io::ErrorKind;
use std::path::Path;

use walkdir::WalkDir;

use super::file_info::FileInfo;
use super::filter::EventFilter;
use super::tree::FileTree;
use crate::error::RegistrationError;

/// Scan `root` and build the snapshot tree for a new registration.
///
/// Validates that `root` can be opened as a directory before walking.
///
/// # Errors
///
/// Returns a [`RegistrationError`] if the root is missing, not a
/// directory, or unreadable.
pub fn scan_tree(
    root: &Path,
    recursive: bool,
    filter: &dyn EventFilter,
) -> Result<FileTree, RegistrationError> {
    let meta = std::fs::metadata(root).map_err(|e| root_error(root, &e))?;
    if !meta.is_dir() {
        return Err(RegistrationError::NotADirectory(
            root.display().to_string(),
        ));
    }

    let entries = scan_entries(root, recursive, filter)?;
    Ok(FileTree::from_entries(root, entries))
}

/// Scan the subtree at `scope`, applying `filter` below the scope entry.
///
/// A missing scope yields an empty list rather than an error: the diff
/// engine treats "nothing on disk" as a removal of everything recorded.
///
/// # Errors
///
/// Returns a [`RegistrationError`] only for a scope that exists but cannot
/// be walked at all; errors on individual entries are logged and skipped.
pub fn scan_entries(
    scope: &Path,
    recursive: bool,
    filter: &dyn EventFilter,
) -> Result<Vec<FileInfo>, RegistrationError> {
    match std::fs::symlink_metadata(scope) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(root_error(scope, &e)),
        Ok(_) => {}
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut entries = Vec::new();
    let mut walker = WalkDir::new(scope)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter();

    loop {
        let entry = match walker.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                if err.depth() == 0 {
                    return Err(RegistrationError::scan(
                        scope.display().to_string(),
                        err.to_string(),
                    ));
                }
                tracing::warn!(error = %err, "Skipping unreadable entry during scan");
                continue;
            }
        };

        let info = match entry.metadata() {
            Ok(meta) => FileInfo::from_metadata(entry.path(), &meta),
            Err(err) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "Skipping entry with unreadable metadata"
                );
                continue;
            }
        };

        // The scope entry itself always participates; the filter governs
        // everything below it.
        if entry.depth() > 0 && !filter.accepts(&info) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        entries.push(info);
    }

    Ok(entries)
}

/// Map an I/O failure on a scope root to the registration taxonomy.
pub(crate) fn root_error(path: &Path, err: &std::io::Error) -> RegistrationError {
    let display = path.display().to_string();
    match err.kind() {
        ErrorKind::NotFound => RegistrationError::NotFound(display),
        ErrorKind::PermissionDenied => RegistrationError::PermissionDenied {
            path: display,
            reason: err.to_string(),
        },
        _ => RegistrationError::scan(display, err.to_string()),
    }
}
