//! Snapshot tree of a watched subtree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::file_info::FileInfo;

/// Ordered tree of [`FileInfo`] entries mirroring one registration root.
///
/// Entries are keyed by absolute path, so iteration yields depth-first,
/// parent-before-child order. The root entry itself is part of the tree.
/// Descendants of any path form a contiguous key range, which the diff
/// engine relies on for targeted subtree replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    root: PathBuf,
    entries: BTreeMap<PathBuf, FileInfo>,
}

impl FileTree {
    /// Create a tree holding only the given root entry.
    #[must_use]
    pub fn new(root_info: FileInfo) -> Self {
        let root = root_info.path().to_path_buf();
        let mut entries = BTreeMap::new();
        entries.insert(root.clone(), root_info);
        Self { root, entries }
    }

    /// Create a tree for `root` from an arbitrary set of entries.
    #[must_use]
    pub fn from_entries(root: impl Into<PathBuf>, infos: impl IntoIterator<Item = FileInfo>) -> Self {
        let mut entries = BTreeMap::new();
        for info in infos {
            entries.insert(info.path().to_path_buf(), info);
        }
        Self {
            root: root.into(),
            entries,
        }
    }

    /// The registration root this tree mirrors.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of entries, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the entry for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileInfo> {
        self.entries.get(path)
    }

    /// Whether `path` is recorded in the tree.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace one entry.
    pub fn insert(&mut self, info: FileInfo) {
        self.entries.insert(info.path().to_path_buf(), info);
    }

    /// All entries in path (depth-first, parent-before-child) order.
    pub fn iter(&self) -> impl Iterator<Item = &FileInfo> {
        self.entries.values()
    }

    /// Direct children of `path`, in name order.
    pub fn children_of<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a FileInfo> {
        self.subtree(path)
            .filter(move |info| info.path().parent() == Some(path))
    }

    /// Entries at or under `path`, in path order.
    pub fn subtree<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a FileInfo> {
        self.entries
            .range(path.to_path_buf()..)
            .take_while(move |(p, _)| p.starts_with(path))
            .map(|(_, info)| info)
    }

    /// Remove and return every entry at or under `path`, in path order.
    pub fn remove_subtree(&mut self, path: &Path) -> Vec<FileInfo> {
        let keys: Vec<PathBuf> = self
            .entries
            .range(path.to_path_buf()..)
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, _)| p.clone())
            .collect();

        keys.iter()
            .filter_map(|k| self.entries.remove(k))
            .collect()
    }

    /// Replace the subtree rooted at `scope` with `fresh` entries.
    ///
    /// Entries outside `scope` are untouched; the fresh entries must all
    /// live at or under `scope`.
    pub fn replace_subtree(&mut self, scope: &Path, fresh: impl IntoIterator<Item = FileInfo>) {
        self.remove_subtree(scope);
        for info in fresh {
            debug_assert!(info.path().starts_with(scope));
            self.insert(info);
        }
    }
}

impl<'a> IntoIterator for &'a FileTree {
    type Item = &'a FileInfo;
    type IntoIter = std::collections::btree_map::Values<'a, PathBuf, FileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> FileInfo {
        FileInfo::new(path, false, 1, 1)
    }

    fn dir(path: &str) -> FileInfo {
        FileInfo::new(path, true, 1, 0)
    }

    fn sample_tree() -> FileTree {
        FileTree::from_entries(
            "/w",
            vec![
                dir("/w"),
                file("/w/a.txt"),
                dir("/w/sub"),
                file("/w/sub/one.rs"),
                file("/w/sub/two.rs"),
                dir("/w/subzero"),
                file("/w/z.txt"),
            ],
        )
    }

    #[test]
    fn test_iteration_is_parent_before_child() {
        let tree = sample_tree();
        let paths: Vec<_> = tree.iter().map(|i| i.path().to_path_buf()).collect();
        let sub_pos = paths.iter().position(|p| p == Path::new("/w/sub")).unwrap();
        let child_pos = paths
            .iter()
            .position(|p| p == Path::new("/w/sub/one.rs"))
            .unwrap();
        assert!(sub_pos < child_pos);
        assert_eq!(paths[0], PathBuf::from("/w"));
    }

    #[test]
    fn test_children_of_root() {
        let tree = sample_tree();
        let children: Vec<_> = tree
            .children_of(Path::new("/w"))
            .filter_map(FileInfo::name)
            .collect();
        assert_eq!(children, vec!["a.txt", "sub", "subzero", "z.txt"]);
    }

    #[test]
    fn test_subtree_excludes_similarly_named_sibling() {
        let tree = sample_tree();
        let sub: Vec<_> = tree
            .subtree(Path::new("/w/sub"))
            .map(|i| i.path().to_path_buf())
            .collect();
        assert_eq!(
            sub,
            vec![
                PathBuf::from("/w/sub"),
                PathBuf::from("/w/sub/one.rs"),
                PathBuf::from("/w/sub/two.rs"),
            ]
        );
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = sample_tree();
        let removed = tree.remove_subtree(Path::new("/w/sub"));
        assert_eq!(removed.len(), 3);
        assert!(!tree.contains(Path::new("/w/sub/one.rs")));
        assert!(tree.contains(Path::new("/w/subzero")));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_replace_subtree() {
        let mut tree = sample_tree();
        tree.replace_subtree(
            Path::new("/w/sub"),
            vec![dir("/w/sub"), file("/w/sub/three.rs")],
        );
        assert!(tree.contains(Path::new("/w/sub/three.rs")));
        assert!(!tree.contains(Path::new("/w/sub/one.rs")));
        assert!(tree.contains(Path::new("/w/a.txt")));
    }

    #[test]
    fn test_new_holds_root_only() {
        let tree = FileTree::new(dir("/w"));
        assert_eq!(tree.len(), 1);
        assert!(tree.contains(Path::new("/w")));
    }
}
