//! Platform change-notification backends.
//!
//! A backend establishes and tears down low-level watches and pushes raw,
//! possibly coalesced or dropped notifications over a channel. Backends
//! never inspect snapshot trees: when a platform has no native recursive
//! primitive the engine synthesizes recursion by registering one watch per
//! directory, steered by the diff engine's output.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::RegistrationError;

/// Token for one established low-level watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchDescriptor {
    id: u64,
    path: PathBuf,
}

impl WatchDescriptor {
    /// Mint a descriptor. Backend implementations are responsible for
    /// issuing ids unique within their own lifetime.
    #[must_use]
    pub fn new(id: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    /// Path the watch was established for.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Backend-native classification of a raw notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Removed,
    Renamed,
    Unknown,
}

/// One unreconciled change signal. May be imprecise or coalesced; the
/// engine rescans the implicated subtree rather than trusting the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub path: PathBuf,
    pub kind: RawKind,
}

/// Message pushed by a backend to the monitoring thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A raw change signal.
    Notification(RawNotification),
    /// The OS event queue overflowed; completeness is lost.
    Overflow,
    /// Unrecoverable fault, scoped to `paths` when non-empty.
    Fault { message: String, paths: Vec<PathBuf> },
}

/// Capability contract each platform driver satisfies.
pub trait Backend: Send {
    /// Whether the platform watches subtrees with a single native
    /// recursive watch. When false the engine registers one watch per
    /// directory and maintains child watches as directories come and go.
    fn native_recursive(&self) -> bool;

    /// Establish a watch for `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] when the watch cannot be created,
    /// e.g. on permission or resource-limit failures.
    fn establish_watch(
        &mut self,
        path: &Path,
        recursive: bool,
    ) -> Result<WatchDescriptor, RegistrationError>;

    /// Tear down a previously established watch. Releasing a watch whose
    /// path already vanished is a no-op.
    fn release_watch(&mut self, descriptor: &WatchDescriptor);
}

/// Production driver backed by the platform watcher `notify` selects
/// (inotify, FSEvents, `ReadDirectoryChangesW`).
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    next_id: AtomicU64,
}

impl NotifyBackend {
    /// Create the driver and the channel its notifications arrive on.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] if the platform watcher cannot be
    /// created at all.
    pub fn new() -> Result<(Self, Receiver<BackendEvent>), RegistrationError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |result| forward_event(&tx, result))
            .map_err(|e| RegistrationError::WatchLimit {
                path: "init".to_string(),
                reason: e.to_string(),
            })?;

        Ok((
            Self {
                watcher,
                next_id: AtomicU64::new(1),
            },
            rx,
        ))
    }
}

impl Backend for NotifyBackend {
    fn native_recursive(&self) -> bool {
        cfg!(any(target_os = "macos", target_os = "windows"))
    }

    fn establish_watch(
        &mut self,
        path: &Path,
        recursive: bool,
    ) -> Result<WatchDescriptor, RegistrationError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        self.watcher
            .watch(path, mode)
            .map_err(|e| establish_error(path, &e))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = %path.display(), id, recursive, "Watch established");
        Ok(WatchDescriptor::new(id, path))
    }

    fn release_watch(&mut self, descriptor: &WatchDescriptor) {
        if let Err(e) = self.watcher.unwatch(&descriptor.path) {
            // The kernel already dropped watches on deleted paths.
            tracing::debug!(
                path = %descriptor.path.display(),
                error = %e,
                "Unwatch failed"
            );
        }
    }
}

fn forward_event(tx: &Sender<BackendEvent>, result: Result<notify::Event, notify::Error>) {
    match result {
        Ok(event) => {
            for mapped in map_event(&event) {
                let _ = tx.send(mapped);
            }
        }
        Err(error) => match error.kind {
            notify::ErrorKind::WatchNotFound | notify::ErrorKind::PathNotFound => {
                tracing::debug!(error = %error, "Ignoring stale watch error");
            }
            _ => {
                let _ = tx.send(BackendEvent::Fault {
                    message: error.to_string(),
                    paths: error.paths,
                });
            }
        },
    }
}

fn map_event(event: &notify::Event) -> Vec<BackendEvent> {
    if event.need_rescan() {
        return vec![BackendEvent::Overflow];
    }

    let kind = match event.kind {
        EventKind::Create(_) => RawKind::Created,
        EventKind::Remove(_) => RawKind::Removed,
        EventKind::Modify(ModifyKind::Name(_)) => RawKind::Renamed,
        EventKind::Modify(_) => RawKind::Modified,
        EventKind::Access(_) => return Vec::new(),
        EventKind::Any | EventKind::Other => RawKind::Unknown,
    };

    event
        .paths
        .iter()
        .map(|path| {
            BackendEvent::Notification(RawNotification {
                path: path.clone(),
                kind,
            })
        })
        .collect()
}

fn establish_error(path: &Path, error: &notify::Error) -> RegistrationError {
    let display = path.display().to_string();
    match &error.kind {
        notify::ErrorKind::PathNotFound => RegistrationError::NotFound(display),
        notify::ErrorKind::MaxFilesWatch => RegistrationError::WatchLimit {
            path: display,
            reason: error.to_string(),
        },
        notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            RegistrationError::PermissionDenied {
                path: display,
                reason: error.to_string(),
            }
        }
        _ => RegistrationError::WatchLimit {
            path: display,
            reason: error.to_string(),
        },
    }
}
