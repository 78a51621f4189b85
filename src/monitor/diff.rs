//! Snapshot diff engine.
//!
//! Reconciles a freshly scanned view of a subtree against the last
//! recorded snapshot, producing the canonical ordered event list:
//!
//! 1. `Removed` for entries recorded but no longer present, including
//!    every recorded descendant of a removed directory, emitted
//!    child-before-parent.
//! 2. `Added` for entries present only in the fresh scan, and `Modified`
//!    for entries in both with differing metadata, emitted together in
//!    path order (parent-before-child).
//!
//! Removals come first so a delete-and-recreate burst applies cleanly to a
//! consumer's mirrored tree. Each path appears at most once per batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::events::FileChangeEvent;
use super::file_info::FileInfo;
use super::tree::FileTree;

/// Diff the subtree of `old` rooted at `scope` against `fresh`, a filtered
/// scan of the same scope.
///
/// `fresh` must contain only entries at or under `scope`; an empty slice
/// means the scope no longer exists on disk and everything recorded under
/// it is removed.
#[must_use]
pub fn diff_subtree(old: &FileTree, scope: &Path, fresh: &[FileInfo]) -> Vec<FileChangeEvent> {
    let fresh_by_path: BTreeMap<&Path, &FileInfo> =
        fresh.iter().map(|info| (info.path(), info)).collect();

    let mut events = Vec::new();

    // Removals, child-before-parent.
    let mut removed: Vec<&FileInfo> = old
        .subtree(scope)
        .filter(|info| !fresh_by_path.contains_key(info.path()))
        .collect();
    removed.reverse();
    events.extend(removed.into_iter().map(|info| FileChangeEvent::removed(info.clone())));

    // Additions and modifications, parent-before-child.
    for (path, info) in fresh_by_path {
        match old.get(path) {
            None => events.push(FileChangeEvent::added((*info).clone())),
            Some(previous) if previous.metadata_differs(info) => {
                events.push(FileChangeEvent::modified((*info).clone()));
            }
            Some(_) => {}
        }
    }

    events
}

/// Diff two full trees sharing a root.
#[must_use]
pub fn diff_trees(old: &FileTree, new: &FileTree) -> Vec<FileChangeEvent> {
    let fresh: Vec<FileInfo> = new.iter().cloned().collect();
    diff_subtree(old, old.root(), &fresh)
}

/// Splice a fresh scan of `scope` into the stored tree, making the tree
/// reflect the state the emitted batch described.
pub fn apply_rescan(tree: &mut FileTree, scope: &Path, fresh: Vec<FileInfo>) {
    tree.replace_subtree(scope, fresh);
}

/// Compute the outermost members of a set of directories, dropping any
/// path nested under another. Used to minimize rescan scopes.
#[must_use]
pub fn outermost_scopes(mut scopes: Vec<PathBuf>) -> Vec<PathBuf> {
    scopes.sort();
    scopes.dedup();
    let mut result: Vec<PathBuf> = Vec::new();
    for scope in scopes {
        if !result.last().is_some_and(|kept| scope.starts_with(kept)) {
            result.push(scope);
        }
    }
    result
}
