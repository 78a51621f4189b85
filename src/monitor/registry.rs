//! Registration state and the process-wide registration table.
//!
//! Lifecycle of a registration: `Requested` (inside `register_monitor`,
//! before any table entry exists) → `Active` (entry present in the
//! registry) → `Error`/`Unregistered` (entry removed). Because an entry
//! exists only while active and removal returns exclusive ownership,
//! concurrent unregister paths race on `remove` and exactly one of them
//! performs teardown; the others observe a no-op.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::backend::WatchDescriptor;
use super::events::FileChangeEvent;
use super::filter::BoxedFilter;
use super::tree::FileTree;
use crate::error::Error;

/// Opaque capability referencing one registration, used only for
/// unregistration.
///
/// Identity is the uuid *and* the registry slot: a slot number may be
/// reused by a later registration, but its handle carries a fresh uuid,
/// so a stale handle can never alias the new occupant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    id: Uuid,
    slot: u64,
}

impl Handle {
    pub(crate) fn mint(slot: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot,
        }
    }

    /// Unique identity of this handle.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn slot(&self) -> u64 {
        self.slot
    }
}

type RegisteredFn = dyn Fn(&Handle, &FileTree) + Send + Sync;
type ErrorFn = dyn Fn(&Error) + Send + Sync;
type FilesChangedFn = dyn Fn(&[FileChangeEvent]) + Send + Sync;

/// Notification sinks bound once at registration time.
///
/// All slots are optional. Closures are owned by the registry for the
/// lifetime of the registration; state a client needs inside a callback
/// must be captured by value or behind an explicit shared-ownership
/// handle, valid until unregister or process stop. Callbacks are invoked
/// on whichever thread calls `check_for_changes`.
#[derive(Default)]
pub struct Callbacks {
    registered: Option<Box<RegisteredFn>>,
    registration_error: Option<Box<ErrorFn>>,
    monitoring_error: Option<Box<ErrorFn>>,
    files_changed: Option<Box<FilesChangedFn>>,
}

impl Callbacks {
    /// Create an empty callback set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called exactly once after a successful registration, with the
    /// handle and the initial snapshot tree.
    #[must_use]
    pub fn on_registered(mut self, f: impl Fn(&Handle, &FileTree) + Send + Sync + 'static) -> Self {
        self.registered = Some(Box::new(f));
        self
    }

    /// Called exactly once if, and only if, registration fails.
    #[must_use]
    pub fn on_registration_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.registration_error = Some(Box::new(f));
        self
    }

    /// Called at most once per registration; always the last callback for
    /// its handle, after which the monitor has been unregistered.
    #[must_use]
    pub fn on_monitoring_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.monitoring_error = Some(Box::new(f));
        self
    }

    /// Called with each non-empty ordered batch of change events.
    #[must_use]
    pub fn on_files_changed(
        mut self,
        f: impl Fn(&[FileChangeEvent]) + Send + Sync + 'static,
    ) -> Self {
        self.files_changed = Some(Box::new(f));
        self
    }

    pub(crate) fn notify_registered(&self, handle: &Handle, tree: &FileTree) {
        if let Some(f) = &self.registered {
            f(handle, tree);
        }
    }

    pub(crate) fn notify_registration_error(&self, error: &Error) {
        if let Some(f) = &self.registration_error {
            f(error);
        }
    }

    pub(crate) fn notify_monitoring_error(&self, error: &Error) {
        if let Some(f) = &self.monitoring_error {
            f(error);
        }
    }

    pub(crate) fn notify_files_changed(&self, events: &[FileChangeEvent]) {
        if let Some(f) = &self.files_changed {
            f(events);
        }
    }
}

/// Full internal state backing one registration.
pub(crate) struct Registration {
    pub root: PathBuf,
    pub recursive: bool,
    pub filter: BoxedFilter,
    pub callbacks: Arc<Callbacks>,
    pub tree: FileTree,
    pub watches: Vec<WatchDescriptor>,
    pub handle_id: Uuid,
}

impl Registration {
    /// Whether an event at `path` concerns this registration.
    ///
    /// Non-recursive monitors only react to the root and its direct
    /// children.
    pub fn covers(&self, path: &Path) -> bool {
        if !path.starts_with(&self.root) {
            return false;
        }
        self.recursive || path == self.root || path.parent() == Some(self.root.as_path())
    }
}

#[derive(Default)]
struct RegistryInner {
    next_slot: u64,
    slots: HashMap<u64, Registration>,
}

/// Process-wide table mapping handles to registrations.
#[derive(Default)]
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration, minting its handle.
    pub fn insert(&self, mut registration: Registration) -> Handle {
        let mut inner = self.inner.lock();
        inner.next_slot += 1;
        let handle = Handle::mint(inner.next_slot);
        registration.handle_id = handle.id();
        inner.slots.insert(handle.slot(), registration);
        handle
    }

    /// Remove by handle, validating the uuid. Returns the owned
    /// registration for teardown, or `None` for stale/unknown handles.
    pub fn remove(&self, handle: &Handle) -> Option<Registration> {
        let mut inner = self.inner.lock();
        let identity_matches = inner
            .slots
            .get(&handle.slot())
            .is_some_and(|reg| reg.handle_id == handle.id());
        if identity_matches {
            inner.slots.remove(&handle.slot())
        } else {
            None
        }
    }

    /// Remove by slot, regardless of handle identity. Used for implicit
    /// unregistration on monitoring errors and for `stop`.
    pub fn remove_slot(&self, slot: u64) -> Option<Registration> {
        self.inner.lock().slots.remove(&slot)
    }

    /// Remove every registration, returning them for teardown.
    pub fn drain(&self) -> Vec<Registration> {
        let mut inner = self.inner.lock();
        inner.slots.drain().map(|(_, reg)| reg).collect()
    }

    pub fn is_live(&self, slot: u64) -> bool {
        self.inner.lock().slots.contains_key(&slot)
    }

    pub fn live_slots(&self) -> Vec<u64> {
        self.inner.lock().slots.keys().copied().collect()
    }

    /// Slots of registrations concerned by an event at `path`.
    pub fn slots_covering(&self, path: &Path) -> Vec<u64> {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|(_, reg)| reg.covers(path))
            .map(|(slot, _)| *slot)
            .collect()
    }

    /// Run `f` with mutable access to the registration in `slot`.
    pub fn with_mut<R>(&self, slot: u64, f: impl FnOnce(&mut Registration) -> R) -> Option<R> {
        self.inner.lock().slots.get_mut(&slot).map(f)
    }

    /// Callbacks of the registration in `slot`, if live.
    pub fn callbacks(&self, slot: u64) -> Option<Arc<Callbacks>> {
        self.inner
            .lock()
            .slots
            .get(&slot)
            .map(|reg| Arc::clone(&reg.callbacks))
    }
}
