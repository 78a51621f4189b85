//! The monitoring engine and its process-global facade.
//!
//! One dedicated background thread consumes raw backend notifications,
//! reconciles them against each registration's snapshot tree, and appends
//! the resulting deliveries to a pending queue. Client callbacks are only
//! ever invoked from [`MonitorService::check_for_changes`], on the calling
//! thread.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::backend::{Backend, BackendEvent, NotifyBackend, WatchDescriptor};
use super::diff::{self, outermost_scopes};
use super::events::{ChangeKind, FileChangeEvent};
use super::file_info::FileInfo;
use super::filter::BoxedFilter;
use super::registry::{Callbacks, Handle, Registration, Registry};
use super::scan::{root_error, scan_entries, scan_tree};
use super::tree::FileTree;
use crate::error::{Error, MonitoringError, RegistrationError, Result};

enum Control {
    Shutdown,
    Flush(Sender<()>),
}

enum Delivery {
    Registered {
        callbacks: Arc<Callbacks>,
        handle: Handle,
        tree: FileTree,
    },
    RegistrationError {
        callbacks: Arc<Callbacks>,
        error: Error,
    },
    MonitoringError {
        callbacks: Arc<Callbacks>,
        error: Error,
    },
    FilesChanged {
        slot: u64,
        callbacks: Arc<Callbacks>,
        events: Vec<FileChangeEvent>,
    },
}

struct Shared {
    registry: Registry,
    backend: Mutex<Box<dyn Backend>>,
    native_recursive: bool,
    pending: Mutex<VecDeque<Delivery>>,
    dispatch: Mutex<()>,
    running: AtomicBool,
}

/// Recursive directory-change monitoring service.
///
/// Most programs use the process-global facade ([`initialize`], [`stop`],
/// [`register_monitor`], [`unregister_monitor`], [`check_for_changes`]);
/// constructing a service directly is useful for embedding or for driving
/// the engine with a custom [`Backend`].
pub struct MonitorService {
    shared: Arc<Shared>,
    control_tx: Sender<Control>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorService {
    /// Start a service with the platform backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher or the monitoring thread
    /// cannot be created.
    pub fn start() -> Result<Self> {
        let (backend, events) = NotifyBackend::new()?;
        Self::with_backend(Box::new(backend), events)
    }

    /// Start a service driving a caller-supplied backend. `events` must be
    /// the receiving side of the channel the backend pushes into.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitoring thread cannot be spawned.
    pub fn with_backend(
        backend: Box<dyn Backend>,
        events: Receiver<BackendEvent>,
    ) -> Result<Self> {
        let native_recursive = backend.native_recursive();
        let shared = Arc::new(Shared {
            registry: Registry::new(),
            backend: Mutex::new(backend),
            native_recursive,
            pending: Mutex::new(VecDeque::new()),
            dispatch: Mutex::new(()),
            running: AtomicBool::new(true),
        });

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("vigil-monitor".to_string())
            .spawn(move || run_monitor_loop(&thread_shared, &events, &control_rx))
            .map_err(|e| Error::internal(format!("failed to spawn monitoring thread: {e}")))?;

        tracing::info!(native_recursive, "Monitoring service started");
        Ok(Self {
            shared,
            control_tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Register a new monitor rooted at `path`.
    ///
    /// The outcome arrives asynchronously through the callbacks at the
    /// next [`Self::check_for_changes`]: `on_registered` with the handle
    /// and initial snapshot tree, or `on_registration_error`. The initial
    /// recursive scan runs synchronously on the calling thread; its cost
    /// is proportional to the subtree size.
    pub fn register_monitor(
        &self,
        path: &Path,
        recursive: bool,
        filter: BoxedFilter,
        callbacks: Callbacks,
    ) {
        let callbacks = Arc::new(callbacks);
        match self.try_register(path, recursive, filter, &callbacks) {
            Ok((handle, tree)) => {
                tracing::info!(
                    path = %path.display(),
                    recursive,
                    entries = tree.len(),
                    "Monitor registered"
                );
                self.enqueue(Delivery::Registered {
                    callbacks,
                    handle,
                    tree,
                });
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "Registration failed");
                self.enqueue(Delivery::RegistrationError {
                    callbacks,
                    error: error.into(),
                });
            }
        }
    }

    fn try_register(
        &self,
        path: &Path,
        recursive: bool,
        filter: BoxedFilter,
        callbacks: &Arc<Callbacks>,
    ) -> std::result::Result<(Handle, FileTree), RegistrationError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(RegistrationError::NotRunning);
        }

        let root = std::fs::canonicalize(path).map_err(|e| root_error(path, &e))?;
        let meta = std::fs::metadata(&root).map_err(|e| root_error(&root, &e))?;
        if !meta.is_dir() {
            return Err(RegistrationError::NotADirectory(root.display().to_string()));
        }

        // Watch before scanning so changes racing the scan still produce
        // notifications; the first rescan reconciles them.
        let root_watch = {
            let mut backend = self.shared.backend.lock();
            backend.establish_watch(&root, recursive && self.shared.native_recursive)?
        };
        let mut watches = vec![root_watch];

        let tree = match scan_tree(&root, recursive, filter.as_ref()) {
            Ok(tree) => tree,
            Err(err) => {
                self.release_watches(&watches);
                return Err(err);
            }
        };

        if recursive && !self.shared.native_recursive {
            let mut backend = self.shared.backend.lock();
            for info in tree.iter().filter(|i| i.is_dir() && i.path() != root) {
                match backend.establish_watch(info.path(), false) {
                    Ok(descriptor) => watches.push(descriptor),
                    Err(err) => {
                        drop(backend);
                        self.release_watches(&watches);
                        return Err(err);
                    }
                }
            }
        }

        let handle = self.shared.registry.insert(Registration {
            root,
            recursive,
            filter,
            callbacks: Arc::clone(callbacks),
            tree: tree.clone(),
            watches,
            handle_id: uuid::Uuid::nil(),
        });

        Ok((handle, tree))
    }

    /// Unregister a monitor. Idempotent: unknown or already-removed
    /// handles are a no-op, since monitors are also unregistered
    /// automatically on monitoring errors and on [`Self::shutdown`].
    pub fn unregister_monitor(&self, handle: &Handle) {
        if let Some(registration) = self.shared.registry.remove(handle) {
            self.release_watches(&registration.watches);
            tracing::info!(root = %registration.root.display(), "Monitor unregistered");
        }
    }

    /// Drain pending deliveries, invoking callbacks on the calling thread.
    ///
    /// May be called from any thread, including a different thread per
    /// invocation; concurrent calls are serialized internally. Must not be
    /// called from inside a callback.
    pub fn check_for_changes(&self) {
        let _guard = self.shared.dispatch.lock();
        loop {
            let Some(item) = self.pop_pending() else { break };
            match item {
                Delivery::Registered {
                    callbacks,
                    handle,
                    tree,
                } => {
                    // Skip when stop() or a monitoring error tore the
                    // registration down before the client saw the handle.
                    if self.shared.registry.is_live(handle.slot()) {
                        callbacks.notify_registered(&handle, &tree);
                    }
                }
                Delivery::RegistrationError { callbacks, error } => {
                    callbacks.notify_registration_error(&error);
                }
                Delivery::MonitoringError { callbacks, error } => {
                    callbacks.notify_monitoring_error(&error);
                }
                Delivery::FilesChanged {
                    slot,
                    callbacks,
                    events,
                } => {
                    if self.shared.registry.is_live(slot) {
                        callbacks.notify_files_changed(&events);
                    }
                }
            }
        }
    }

    /// Block until the monitoring thread has processed every raw
    /// notification queued so far. Useful before a final
    /// [`Self::check_for_changes`] in shutdown paths and tests.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.control_tx.send(Control::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Unregister every live monitor and terminate the monitoring thread.
    /// Pending undelivered callbacks are discarded. Safe to call more than
    /// once and with zero registrations.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.control_tx.send(Control::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }

        for registration in self.shared.registry.drain() {
            self.release_watches(&registration.watches);
        }
        self.shared.pending.lock().clear();
        tracing::info!("Monitoring service stopped");
    }

    fn release_watches(&self, watches: &[WatchDescriptor]) {
        let mut backend = self.shared.backend.lock();
        for descriptor in watches {
            backend.release_watch(descriptor);
        }
    }

    fn enqueue(&self, delivery: Delivery) {
        self.shared.pending.lock().push_back(delivery);
    }

    fn pop_pending(&self) -> Option<Delivery> {
        self.shared.pending.lock().pop_front()
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_monitor_loop(
    shared: &Arc<Shared>,
    events: &Receiver<BackendEvent>,
    control: &Receiver<Control>,
) {
    loop {
        crossbeam_channel::select! {
            recv(control) -> message => match message {
                Ok(Control::Shutdown) | Err(_) => break,
                Ok(Control::Flush(ack)) => {
                    let batch: Vec<BackendEvent> = events.try_iter().collect();
                    if !batch.is_empty() {
                        process_batch(shared, batch);
                    }
                    let _ = ack.send(());
                }
            },
            recv(events) -> event => {
                let Ok(event) = event else { break };
                // Coalesce whatever else the burst already delivered.
                let mut batch = vec![event];
                batch.extend(events.try_iter());
                process_batch(shared, batch);
            },
        }
    }
    tracing::debug!("Monitoring thread exiting");
}

fn process_batch(shared: &Arc<Shared>, batch: Vec<BackendEvent>) {
    let mut notified_paths: Vec<PathBuf> = Vec::new();

    for event in batch {
        match event {
            BackendEvent::Notification(raw) => {
                tracing::trace!(path = %raw.path.display(), kind = ?raw.kind, "Raw notification");
                notified_paths.push(raw.path);
            }
            BackendEvent::Overflow => {
                tracing::warn!("Backend event queue overflowed");
                fail_slots(shared, shared.registry.live_slots(), || {
                    MonitoringError::Overflow.into()
                });
                return;
            }
            BackendEvent::Fault { message, paths } => {
                tracing::error!(fault = %message, "Backend fault");
                let slots = if paths.is_empty() {
                    shared.registry.live_slots()
                } else {
                    let mut slots: Vec<u64> = paths
                        .iter()
                        .flat_map(|p| shared.registry.slots_covering(p))
                        .collect();
                    slots.sort_unstable();
                    slots.dedup();
                    slots
                };
                fail_slots(shared, slots, || {
                    MonitoringError::BackendFault(message.clone()).into()
                });
            }
        }
    }

    if notified_paths.is_empty() {
        return;
    }

    notified_paths.sort();
    notified_paths.dedup();

    let mut implicated: Vec<u64> = notified_paths
        .iter()
        .flat_map(|p| shared.registry.slots_covering(p))
        .collect();
    implicated.sort_unstable();
    implicated.dedup();

    for slot in implicated {
        reconcile_slot(shared, slot, &notified_paths);
    }
}

/// Rescan and diff one registration against the paths implicated by a
/// notification burst.
fn reconcile_slot(shared: &Arc<Shared>, slot: u64, notified_paths: &[PathBuf]) {
    enum Outcome {
        Quiet,
        Changed {
            events: Vec<FileChangeEvent>,
            added_dirs: Vec<PathBuf>,
            removed_dirs: Vec<PathBuf>,
        },
        RootGone,
    }

    let outcome = shared.registry.with_mut(slot, |reg| {
        if !reg.root.exists() {
            return Outcome::RootGone;
        }

        let scopes: Vec<PathBuf> = notified_paths
            .iter()
            .filter(|path| reg.covers(path.as_path()))
            .filter_map(|path| rescan_scope(reg, path.as_path()))
            .collect();
        let scopes = outermost_scopes(scopes);

        let mut events = Vec::new();
        for scope in &scopes {
            let fresh = match scan_entries(scope, reg.recursive, reg.filter.as_ref()) {
                Ok(fresh) => fresh,
                Err(err) => {
                    tracing::warn!(
                        scope = %scope.display(),
                        error = %err,
                        "Rescan failed; skipping scope"
                    );
                    continue;
                }
            };
            events.extend(diff::diff_subtree(&reg.tree, scope, &fresh));
            diff::apply_rescan(&mut reg.tree, scope, fresh);
        }

        if events.is_empty() {
            return Outcome::Quiet;
        }

        let added_dirs = dirs_with_kind(&events, ChangeKind::Added);
        let removed_dirs = dirs_with_kind(&events, ChangeKind::Removed);
        Outcome::Changed {
            events,
            added_dirs,
            removed_dirs,
        }
    });

    match outcome {
        None | Some(Outcome::Quiet) => {}
        Some(Outcome::RootGone) => {
            let root = shared
                .registry
                .with_mut(slot, |reg| reg.root.clone())
                .unwrap_or_default();
            fail_slots(shared, vec![slot], || {
                MonitoringError::RootRemoved(root.display().to_string()).into()
            });
        }
        Some(Outcome::Changed {
            events,
            added_dirs,
            removed_dirs,
        }) => {
            update_child_watches(shared, slot, &added_dirs, &removed_dirs);
            if let Some(callbacks) = shared.registry.callbacks(slot) {
                tracing::debug!(slot, events = events.len(), "Change batch queued");
                shared.pending.lock().push_back(Delivery::FilesChanged {
                    slot,
                    callbacks,
                    events,
                });
            }
        }
    }
}

/// Choose the subtree to rescan for a notification at `path`: the nearest
/// directory recorded in the snapshot, clamped to the root. Notifications
/// under a subtree the filter excludes are dropped outright.
fn rescan_scope(reg: &Registration, path: &Path) -> Option<PathBuf> {
    if !reg.recursive {
        return Some(reg.root.clone());
    }
    if path == reg.root {
        return Some(reg.root.clone());
    }

    for ancestor in path.ancestors().skip(1) {
        if ancestor == reg.root {
            break;
        }
        let probe = FileInfo::from_path(ancestor)
            .unwrap_or_else(|_| FileInfo::new(ancestor, true, 0, 0));
        if !reg.filter.accepts(&probe) {
            return None;
        }
    }

    let mut scope = path;
    loop {
        if scope == reg.root {
            return Some(reg.root.clone());
        }
        if reg.tree.get(scope).is_some_and(FileInfo::is_dir) {
            return Some(scope.to_path_buf());
        }
        scope = scope.parent()?;
    }
}

fn dirs_with_kind(events: &[FileChangeEvent], kind: ChangeKind) -> Vec<PathBuf> {
    events
        .iter()
        .filter(|e| e.kind == kind && e.info.is_dir())
        .map(|e| e.info.path().to_path_buf())
        .collect()
}

/// Keep per-directory watches aligned with the tree when the backend has
/// no native recursive primitive.
fn update_child_watches(
    shared: &Arc<Shared>,
    slot: u64,
    added_dirs: &[PathBuf],
    removed_dirs: &[PathBuf],
) {
    if shared.native_recursive {
        return;
    }
    let recursive = shared
        .registry
        .with_mut(slot, |reg| reg.recursive)
        .unwrap_or(false);
    if !recursive {
        return;
    }

    let removed_set: BTreeSet<&Path> = removed_dirs.iter().map(PathBuf::as_path).collect();
    let stale = shared
        .registry
        .with_mut(slot, |reg| {
            let mut stale = Vec::new();
            reg.watches.retain(|descriptor| {
                if removed_set.contains(descriptor.path()) {
                    stale.push(descriptor.clone());
                    false
                } else {
                    true
                }
            });
            stale
        })
        .unwrap_or_default();

    {
        let mut backend = shared.backend.lock();
        for descriptor in &stale {
            backend.release_watch(descriptor);
        }
    }

    let mut fresh = Vec::new();
    {
        let mut backend = shared.backend.lock();
        for dir in added_dirs {
            match backend.establish_watch(dir, false) {
                Ok(descriptor) => fresh.push(descriptor),
                Err(err) => {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %err,
                        "Could not watch new directory"
                    );
                }
            }
        }
    }

    let adopted = shared.registry.with_mut(slot, |reg| {
        reg.watches.extend(fresh.iter().cloned());
    });
    if adopted.is_none() {
        // Registration died while we were establishing watches.
        let mut backend = shared.backend.lock();
        for descriptor in &fresh {
            backend.release_watch(descriptor);
        }
    }
}

/// Implicitly unregister `slots`, releasing backend resources before the
/// monitoring-error delivery is queued.
fn fail_slots(shared: &Arc<Shared>, slots: Vec<u64>, error: impl Fn() -> Error) {
    for slot in slots {
        if let Some(registration) = shared.registry.remove_slot(slot) {
            {
                let mut backend = shared.backend.lock();
                for descriptor in &registration.watches {
                    backend.release_watch(descriptor);
                }
            }
            let error = error();
            tracing::warn!(root = %registration.root.display(), error = %error, "Monitor failed");
            shared.pending.lock().push_back(Delivery::MonitoringError {
                callbacks: Arc::clone(&registration.callbacks),
                error,
            });
        }
    }
}

static GLOBAL: Lazy<Mutex<Option<Arc<MonitorService>>>> = Lazy::new(|| Mutex::new(None));

fn global_service() -> Option<Arc<MonitorService>> {
    GLOBAL.lock().as_ref().map(Arc::clone)
}

/// Initialize the process-global monitoring service, creating its
/// background thread. Must complete before any [`register_monitor`] call.
///
/// # Errors
///
/// Returns an error if the service is already initialized or the platform
/// backend cannot be created.
pub fn initialize() -> Result<()> {
    let mut global = GLOBAL.lock();
    if global.is_some() {
        return Err(Error::config("monitoring service already initialized"));
    }
    *global = Some(Arc::new(MonitorService::start()?));
    Ok(())
}

/// Stop the process-global service: unregisters all active monitors and
/// terminates the background thread. Safe to call with zero registrations
/// or when never initialized.
pub fn stop() {
    let taken = GLOBAL.lock().take();
    if let Some(service) = taken {
        service.shutdown();
    }
}

/// Register a monitor with the process-global service. See
/// [`MonitorService::register_monitor`].
///
/// If the service is not initialized, `on_registration_error` is invoked
/// synchronously with [`RegistrationError::NotRunning`].
pub fn register_monitor(path: &Path, recursive: bool, filter: BoxedFilter, callbacks: Callbacks) {
    match global_service() {
        Some(service) => service.register_monitor(path, recursive, filter, callbacks),
        None => callbacks.notify_registration_error(&RegistrationError::NotRunning.into()),
    }
}

/// Unregister a monitor from the process-global service; a no-op when the
/// handle is unknown, already unregistered, or the service is stopped.
pub fn unregister_monitor(handle: &Handle) {
    if let Some(service) = global_service() {
        service.unregister_monitor(handle);
    }
}

/// Drain and dispatch pending deliveries of the process-global service on
/// the calling thread; a no-op when the service is not initialized.
pub fn check_for_changes() {
    if let Some(service) = global_service() {
        service.check_for_changes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::backend::{RawKind, RawNotification};
    use crate::monitor::filter::{accept_all, exclude_directory_filter};
    use std::fs;
    use tempfile::TempDir;

    struct MockBackend {
        native_recursive: bool,
        next_id: u64,
        watched: Arc<Mutex<Vec<PathBuf>>>,
        fail_on: Option<PathBuf>,
    }

    impl Backend for MockBackend {
        fn native_recursive(&self) -> bool {
            self.native_recursive
        }

        fn establish_watch(
            &mut self,
            path: &Path,
            _recursive: bool,
        ) -> std::result::Result<WatchDescriptor, RegistrationError> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(RegistrationError::WatchLimit {
                    path: path.display().to_string(),
                    reason: "mock limit".to_string(),
                });
            }
            self.next_id += 1;
            self.watched.lock().push(path.to_path_buf());
            Ok(WatchDescriptor::new(self.next_id, path))
        }

        fn release_watch(&mut self, descriptor: &WatchDescriptor) {
            let mut watched = self.watched.lock();
            if let Some(pos) = watched.iter().position(|p| p == descriptor.path()) {
                watched.remove(pos);
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        handle: Mutex<Option<Handle>>,
        tree: Mutex<Option<FileTree>>,
        batches: Mutex<Vec<Vec<FileChangeEvent>>>,
        registration_errors: Mutex<Vec<String>>,
        monitoring_errors: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn callbacks(self: &Arc<Self>) -> Callbacks {
            let on_registered = Arc::clone(self);
            let on_reg_err = Arc::clone(self);
            let on_mon_err = Arc::clone(self);
            let on_changed = Arc::clone(self);
            Callbacks::new()
                .on_registered(move |handle, tree| {
                    *on_registered.handle.lock() = Some(handle.clone());
                    *on_registered.tree.lock() = Some(tree.clone());
                })
                .on_registration_error(move |error| {
                    on_reg_err.registration_errors.lock().push(error.to_string());
                })
                .on_monitoring_error(move |error| {
                    on_mon_err.monitoring_errors.lock().push(error.to_string());
                })
                .on_files_changed(move |events| {
                    on_changed.batches.lock().push(events.to_vec());
                })
        }

        fn handle(&self) -> Handle {
            self.handle.lock().clone().expect("registration delivered")
        }
    }

    struct Fixture {
        service: MonitorService,
        events_tx: Sender<BackendEvent>,
        watched: Arc<Mutex<Vec<PathBuf>>>,
    }

    fn fixture(native_recursive: bool, fail_on: Option<PathBuf>) -> Fixture {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let watched = Arc::new(Mutex::new(Vec::new()));
        let backend = MockBackend {
            native_recursive,
            next_id: 0,
            watched: Arc::clone(&watched),
            fail_on,
        };
        let service = MonitorService::with_backend(Box::new(backend), events_rx).unwrap();
        Fixture {
            service,
            events_tx,
            watched,
        }
    }

    impl Fixture {
        fn notify(&self, path: &Path, kind: RawKind) {
            self.events_tx
                .send(BackendEvent::Notification(RawNotification {
                    path: path.to_path_buf(),
                    kind,
                }))
                .unwrap();
            self.service.flush();
        }
    }

    fn canonical_tmp() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        (tmp, root)
    }

    #[test]
    fn test_register_delivers_initial_tree_on_calling_thread() {
        let (_tmp, root) = canonical_tmp();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("b.txt"), b"b").unwrap();

        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, false, accept_all(), recorder.callbacks());

        // Nothing fires before the dispatch call.
        assert!(recorder.handle.lock().is_none());
        fix.service.check_for_changes();

        let tree = recorder.tree.lock().clone().unwrap();
        assert_eq!(tree.children_of(&root).count(), 2);
        assert!(recorder.registration_errors.lock().is_empty());
    }

    #[test]
    fn test_register_missing_path_reports_error() {
        let (_tmp, root) = canonical_tmp();
        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());

        fix.service.register_monitor(
            &root.join("absent"),
            true,
            accept_all(),
            recorder.callbacks(),
        );
        fix.service.check_for_changes();

        assert!(recorder.handle.lock().is_none());
        let errors = recorder.registration_errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not found"));
    }

    #[test]
    fn test_register_watch_failure_rolls_back() {
        let (_tmp, root) = canonical_tmp();
        fs::create_dir(root.join("sub")).unwrap();

        let fix = fixture(false, Some(root.join("sub")));
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        assert_eq!(recorder.registration_errors.lock().len(), 1);
        assert!(fix.watched.lock().is_empty());
    }

    #[test]
    fn test_created_file_yields_added_event() {
        let (_tmp, root) = canonical_tmp();
        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        let new_file = root.join("c.txt");
        fs::write(&new_file, b"c").unwrap();
        fix.notify(&new_file, RawKind::Created);
        fix.service.check_for_changes();

        let batches = recorder.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].kind, ChangeKind::Added);
        assert_eq!(batches[0][0].path(), new_file);
    }

    #[test]
    fn test_modified_file_yields_modified_event() {
        let (_tmp, root) = canonical_tmp();
        let target = root.join("data.txt");
        fs::write(&target, b"1").unwrap();

        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        fs::write(&target, b"123456").unwrap();
        fix.notify(&target, RawKind::Modified);
        fix.service.check_for_changes();

        let batches = recorder.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].kind, ChangeKind::Modified);
        assert_eq!(batches[0][0].info.size(), 6);
    }

    #[test]
    fn test_removed_directory_emits_children_before_parent() {
        let (_tmp, root) = canonical_tmp();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("inner.txt"), b"x").unwrap();

        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        fs::remove_dir_all(&sub).unwrap();
        fix.notify(&sub, RawKind::Removed);
        fix.service.check_for_changes();

        let batches = recorder.batches.lock();
        assert_eq!(batches.len(), 1);
        let kinds_paths: Vec<_> = batches[0]
            .iter()
            .map(|e| (e.kind, e.path().to_path_buf()))
            .collect();
        assert_eq!(
            kinds_paths,
            vec![
                (ChangeKind::Removed, sub.join("inner.txt")),
                (ChangeKind::Removed, sub.clone()),
            ]
        );
    }

    #[test]
    fn test_unregister_is_idempotent_and_silences_events() {
        let (_tmp, root) = canonical_tmp();
        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        let handle = recorder.handle();
        fix.service.unregister_monitor(&handle);
        fix.service.unregister_monitor(&handle);
        assert!(fix.watched.lock().is_empty());

        let late = root.join("late.txt");
        fs::write(&late, b"x").unwrap();
        fix.notify(&late, RawKind::Created);
        fix.service.check_for_changes();

        assert!(recorder.batches.lock().is_empty());
        assert!(recorder.monitoring_errors.lock().is_empty());
    }

    #[test]
    fn test_events_queued_before_unregister_are_dropped() {
        let (_tmp, root) = canonical_tmp();
        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        let file = root.join("f.txt");
        fs::write(&file, b"x").unwrap();
        fix.notify(&file, RawKind::Created);
        // The batch is pending; unregister before draining it.
        fix.service.unregister_monitor(&recorder.handle());
        fix.service.check_for_changes();

        assert!(recorder.batches.lock().is_empty());
    }

    #[test]
    fn test_overflow_fails_monitor_and_unregisters() {
        let (_tmp, root) = canonical_tmp();
        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        fix.events_tx.send(BackendEvent::Overflow).unwrap();
        fix.service.flush();
        fix.service.check_for_changes();

        let errors = recorder.monitoring_errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("overflowed"));
        assert!(fix.watched.lock().is_empty());

        // No further callbacks for the dead handle.
        drop(errors);
        let file = root.join("f.txt");
        fs::write(&file, b"x").unwrap();
        fix.notify(&file, RawKind::Created);
        fix.service.check_for_changes();
        assert!(recorder.batches.lock().is_empty());
        assert_eq!(recorder.monitoring_errors.lock().len(), 1);
    }

    #[test]
    fn test_root_removal_reports_monitoring_error() {
        let (tmp, _keep) = canonical_tmp();
        let root = tmp.path().join("watched");
        fs::create_dir(&root).unwrap();
        let root = root.canonicalize().unwrap();

        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        fs::remove_dir(&root).unwrap();
        fix.notify(&root, RawKind::Removed);
        fix.service.check_for_changes();

        let errors = recorder.monitoring_errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("watched root removed"));
        assert!(fix.watched.lock().is_empty());
    }

    #[test]
    fn test_synthesized_recursion_maintains_child_watches() {
        let (_tmp, root) = canonical_tmp();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();

        let fix = fixture(false, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        {
            let watched = fix.watched.lock();
            assert!(watched.contains(&root));
            assert!(watched.contains(&sub));
        }

        // A new directory gains a watch once the diff reports it.
        let nested = sub.join("nested");
        fs::create_dir(&nested).unwrap();
        fix.notify(&nested, RawKind::Created);
        assert!(fix.watched.lock().contains(&nested));

        // Removing it drops the watch again.
        fs::remove_dir(&nested).unwrap();
        fix.notify(&nested, RawKind::Removed);
        assert!(!fix.watched.lock().contains(&nested));
    }

    #[test]
    fn test_excluded_directory_produces_no_events() {
        let (_tmp, root) = canonical_tmp();
        let git = root.join(".git");
        fs::create_dir(&git).unwrap();

        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service.register_monitor(
            &root,
            true,
            exclude_directory_filter(".git"),
            recorder.callbacks(),
        );
        fix.service.check_for_changes();

        let config = git.join("config");
        fs::write(&config, b"x").unwrap();
        fix.notify(&config, RawKind::Created);
        fix.notify(&git, RawKind::Modified);
        fix.service.check_for_changes();

        assert!(recorder.batches.lock().is_empty());
    }

    #[test]
    fn test_non_recursive_ignores_deep_changes() {
        let (_tmp, root) = canonical_tmp();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();

        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, false, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        let deep = sub.join("deep.txt");
        fs::write(&deep, b"x").unwrap();
        fix.notify(&deep, RawKind::Created);
        fix.service.check_for_changes();

        assert!(recorder.batches.lock().is_empty());
    }

    #[test]
    fn test_shutdown_releases_everything_and_blocks_registration() {
        let (_tmp, root) = canonical_tmp();
        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());
        fix.service.check_for_changes();

        fix.service.shutdown();
        assert!(fix.watched.lock().is_empty());

        let late = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), late.callbacks());
        fix.service.check_for_changes();
        let errors = late.registration_errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not running"));
    }

    #[test]
    fn test_registered_delivery_skipped_when_torn_down_first() {
        let (_tmp, root) = canonical_tmp();
        let fix = fixture(true, None);
        let recorder = Arc::new(Recorder::default());
        fix.service
            .register_monitor(&root, true, accept_all(), recorder.callbacks());

        // Overflow tears the registration down before the client ever
        // drains the registered delivery.
        fix.events_tx.send(BackendEvent::Overflow).unwrap();
        fix.service.flush();
        fix.service.check_for_changes();

        assert!(recorder.handle.lock().is_none());
        assert_eq!(recorder.monitoring_errors.lock().len(), 1);
    }

    #[test]
    fn test_global_facade_lifecycle() {
        let (_tmp, root) = canonical_tmp();
        fs::write(root.join("seed.txt"), b"x").unwrap();

        // Before initialize: registration errors synchronously, the rest
        // are no-ops.
        let early = Arc::new(Recorder::default());
        register_monitor(&root, true, accept_all(), early.callbacks());
        assert_eq!(early.registration_errors.lock().len(), 1);
        check_for_changes();
        stop();

        initialize().unwrap();
        assert!(initialize().is_err());

        let recorder = Arc::new(Recorder::default());
        register_monitor(&root, true, accept_all(), recorder.callbacks());
        check_for_changes();
        let tree = recorder.tree.lock().clone().unwrap();
        assert!(tree.contains(&root.join("seed.txt")));

        unregister_monitor(&recorder.handle());
        stop();

        // A stopped service can be initialized again.
        initialize().unwrap();
        stop();
    }
}
