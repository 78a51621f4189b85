//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::PathBuf;

/// Main configuration for the vigil CLI and service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directories to monitor for changes.
    pub watch_dirs: Vec<PathBuf>,

    /// Monitor subtrees recursively.
    pub recursive: bool,

    /// Directory names excluded from monitoring, wherever they appear.
    pub exclude_dirs: Vec<String>,

    /// Include hidden files and directories.
    pub include_hidden: bool,

    /// Interval between change-dispatch passes, in milliseconds.
    pub poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON logging output.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dirs: Vec::new(),
            recursive: true,
            exclude_dirs: vec![".git".to_string()],
            include_hidden: false,
            poll_interval_ms: 250,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.watch_dirs.is_empty() {
            return Err(Error::config("at least one watch directory is required"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll_interval_ms cannot be 0"));
        }

        if self.poll_interval_ms > 60_000 {
            return Err(Error::config(
                "poll_interval_ms cannot exceed 60000 (one minute)",
            ));
        }

        for name in &self.exclude_dirs {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(Error::config(format!(
                    "excluded directory name '{name}' must be a bare component"
                )));
            }
        }

        Ok(())
    }
}
