//! Recursive directory-change monitoring.
//!
//! This module provides:
//! - Registration of recursive (or single-level) directory monitors
//! - A snapshot/diff engine turning raw, lossy OS notifications into
//!   ordered add/modify/remove event batches
//! - Synchronous dispatch of client callbacks via [`check_for_changes`]

mod backend;
mod diff;
mod events;
mod file_info;
mod filter;
mod registry;
mod scan;
mod service;
mod tree;

pub use backend::{Backend, BackendEvent, NotifyBackend, RawKind, RawNotification, WatchDescriptor};
pub use diff::{diff_subtree, diff_trees};
pub use events::{ChangeKind, FileChangeEvent};
pub use file_info::FileInfo;
pub use filter::{
    accept_all, all_of, exclude_directories_filter, exclude_directory_filter,
    exclude_hidden_filter, BoxedFilter, EventFilter,
};
pub use registry::{Callbacks, Handle};
pub use service::{
    check_for_changes, initialize, register_monitor, stop, unregister_monitor, MonitorService,
};
pub use tree::FileTree;
