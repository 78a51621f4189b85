//! vigil - cross-platform recursive directory-change monitoring.
//!
//! Clients register interest in a directory subtree and receive ordered
//! add/modify/remove events reconciled against a maintained snapshot
//! tree, without polling. Raw OS notifications may be coalesced or
//! dropped; the engine rescans the implicated subtree and diffs it
//! against the last snapshot, so delivered batches are always internally
//! consistent.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod monitor;
pub mod observability;

pub use config::Config;
pub use error::{Error, MonitoringError, RegistrationError, Result};
pub use monitor::{
    accept_all, all_of, check_for_changes, exclude_directories_filter, exclude_directory_filter,
    exclude_hidden_filter, initialize, register_monitor, stop, unregister_monitor, Callbacks,
    ChangeKind, EventFilter, FileChangeEvent, FileInfo, FileTree, Handle, MonitorService,
};
