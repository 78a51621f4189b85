//! vigil - directory-change monitoring service
//!
//! Entry point for the vigil CLI: registers a monitor per watched
//! directory and streams change events to stdout.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vigil::monitor::{self, BoxedFilter, Callbacks, FileChangeEvent};
use vigil::observability::init_tracing;
use vigil::Config;

/// vigil - directory-change monitoring service
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directories to monitor for changes
    #[arg(
        short,
        long = "watch",
        env = "VIGIL_WATCH_DIRS",
        value_delimiter = ',',
        required = true
    )]
    watch: Vec<PathBuf>,

    /// Do not descend into subdirectories
    #[arg(long, env = "VIGIL_NO_RECURSIVE")]
    no_recursive: bool,

    /// Directory names to exclude, wherever they appear in the tree
    #[arg(
        short,
        long = "exclude",
        env = "VIGIL_EXCLUDE_DIRS",
        value_delimiter = ',',
        default_value = ".git"
    )]
    exclude: Vec<String>,

    /// Include hidden files and directories
    #[arg(long, env = "VIGIL_INCLUDE_HIDDEN")]
    include_hidden: bool,

    /// Interval between change-dispatch passes, in milliseconds
    #[arg(long, env = "VIGIL_POLL_INTERVAL_MS", default_value = "250")]
    poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VIGIL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "VIGIL_LOG_JSON")]
    log_json: bool,

    /// Print change events as JSON lines instead of text
    #[arg(long, env = "VIGIL_JSON_EVENTS")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("vigil v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config {
        watch_dirs: cli.watch,
        recursive: !cli.no_recursive,
        exclude_dirs: cli.exclude,
        include_hidden: cli.include_hidden,
        poll_interval_ms: cli.poll_interval_ms,
        log_level: cli.log_level,
        log_json: cli.log_json,
    };

    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    monitor::initialize()?;

    let json_events = cli.json;
    for dir in &config.watch_dirs {
        let callbacks = Callbacks::new()
            .on_registered({
                let dir = dir.clone();
                move |_handle, tree| {
                    tracing::info!(
                        root = %dir.display(),
                        entries = tree.len(),
                        "Monitor ready"
                    );
                }
            })
            .on_registration_error({
                let dir = dir.clone();
                move |error| {
                    tracing::error!(root = %dir.display(), %error, "Registration failed");
                }
            })
            .on_monitoring_error({
                let dir = dir.clone();
                move |error| {
                    tracing::error!(root = %dir.display(), %error, "Monitor lost");
                }
            })
            .on_files_changed(move |events| print_events(events, json_events));

        monitor::register_monitor(dir, config.recursive, build_filter(&config), callbacks);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => monitor::check_for_changes(),
        }
    }

    tracing::info!("Shutting down");
    monitor::stop();
    Ok(())
}

fn build_filter(config: &Config) -> BoxedFilter {
    let mut filters = vec![monitor::exclude_directories_filter(
        config.exclude_dirs.clone(),
    )];
    if !config.include_hidden {
        filters.push(monitor::exclude_hidden_filter());
    }
    monitor::all_of(filters)
}

fn print_events(events: &[FileChangeEvent], json: bool) {
    for event in events {
        if json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(error) => tracing::warn!(%error, "Could not serialize event"),
            }
        } else {
            println!("{:?} {}", event.kind, event.path().display());
        }
    }
}
