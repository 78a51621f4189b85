//! Error types and Result aliases for vigil.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using vigil's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vigil operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Monitor registration error.
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Error on an active monitor.
    #[error("monitoring error: {0}")]
    Monitoring(#[from] MonitoringError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors that prevent a monitor registration from becoming active.
///
/// Never retried internally; the registration is abandoned and reported
/// once through `on_registration_error`.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The requested path does not exist.
    #[error("path not found: '{0}'")]
    NotFound(String),

    /// The requested path exists but is not a directory.
    #[error("not a directory: '{0}'")]
    NotADirectory(String),

    /// The path could not be opened for watching.
    #[error("permission denied for '{path}': {reason}")]
    PermissionDenied { path: String, reason: String },

    /// The platform refused to allocate another watch.
    #[error("watch limit reached for '{path}': {reason}")]
    WatchLimit { path: String, reason: String },

    /// The initial scan of the subtree failed.
    #[error("failed to scan '{path}': {reason}")]
    Scan { path: String, reason: String },

    /// The monitoring service has not been initialized.
    #[error("monitoring service is not running")]
    NotRunning,
}

/// Unrecoverable faults on an active monitor.
///
/// Each of these is always followed by implicit unregistration; continued
/// monitoring requires the client to register again.
#[derive(Error, Debug)]
pub enum MonitoringError {
    /// The watched root directory disappeared.
    #[error("watched root removed: '{0}'")]
    RootRemoved(String),

    /// The backend event queue overflowed and completeness is lost.
    #[error("backend event queue overflowed")]
    Overflow,

    /// The backend reported an unrecoverable fault.
    #[error("backend fault: {0}")]
    BackendFault(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl RegistrationError {
    /// Create a scan error for a path.
    pub fn scan(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Scan {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
