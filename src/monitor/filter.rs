//! Filter predicates over scanned entries.
//!
//! A filter decides whether an entry participates in a watch. The same
//! filter instance is applied to the initial scan and to every subsequent
//! rescan, so an excluded entry never surfaces in change events. Filters
//! compose by logical AND through [`all_of`]; one registration carries one
//! composed filter.

use std::path::Component;

use super::file_info::FileInfo;

/// Capability deciding whether an entry participates in a watch.
pub trait EventFilter: Send + Sync {
    /// Whether the entry should be included.
    fn accepts(&self, info: &FileInfo) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&FileInfo) -> bool + Send + Sync,
{
    fn accepts(&self, info: &FileInfo) -> bool {
        self(info)
    }
}

/// A boxed filter, as consumed by registration.
pub type BoxedFilter = Box<dyn EventFilter>;

struct AcceptAll;

impl EventFilter for AcceptAll {
    fn accepts(&self, _info: &FileInfo) -> bool {
        true
    }
}

struct ExcludeDirectories {
    names: Vec<String>,
}

impl EventFilter for ExcludeDirectories {
    fn accepts(&self, info: &FileInfo) -> bool {
        !info.path().components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|n| self.names.iter().any(|excluded| excluded == n)),
            _ => false,
        })
    }
}

struct ExcludeHidden;

impl EventFilter for ExcludeHidden {
    fn accepts(&self, info: &FileInfo) -> bool {
        !info.name().is_some_and(|n| n.starts_with('.'))
    }
}

struct AllOf {
    filters: Vec<BoxedFilter>,
}

impl EventFilter for AllOf {
    fn accepts(&self, info: &FileInfo) -> bool {
        self.filters.iter().all(|f| f.accepts(info))
    }
}

/// Filter accepting every entry.
#[must_use]
pub fn accept_all() -> BoxedFilter {
    Box::new(AcceptAll)
}

/// Filter out any directory (and its children) with the given name, no
/// matter where it sits within the tree. Useful for directories like
/// `.git`, `.svn`, or `target`.
#[must_use]
pub fn exclude_directory_filter(name: impl Into<String>) -> BoxedFilter {
    Box::new(ExcludeDirectories {
        names: vec![name.into()],
    })
}

/// Aggregate version of [`exclude_directory_filter`]: an entry is rejected
/// if any of the names appears as a component of its path.
#[must_use]
pub fn exclude_directories_filter(names: impl IntoIterator<Item = impl Into<String>>) -> BoxedFilter {
    Box::new(ExcludeDirectories {
        names: names.into_iter().map(Into::into).collect(),
    })
}

/// Exclude entries whose name begins with the hidden marker (a leading
/// `.` in the final path component).
#[must_use]
pub fn exclude_hidden_filter() -> BoxedFilter {
    Box::new(ExcludeHidden)
}

/// Logical AND over several filters; an entry participates only if every
/// filter accepts it.
#[must_use]
pub fn all_of(filters: Vec<BoxedFilter>) -> BoxedFilter {
    Box::new(AllOf { filters })
}
