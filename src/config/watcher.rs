//! File watcher for the top-level config file.
//!
//! Watches the directory containing the config file (editors often replace
//! the file rather than write it in place) and emits change events through a
//! tokio watch channel. Uses debouncing to coalesce rapid file changes.

use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How often an idle watcher checks whether anyone still listens.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Event types emitted when the config file changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChangeEvent {
    /// The config file was written, created, replaced or removed.
    Changed(PathBuf),
    /// Watcher encountered an error
    Error(String),
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Handle to control the config watcher.
pub struct ConfigWatcherHandle {
    /// Receiver for config change events.
    pub events: watch::Receiver<Option<ConfigChangeEvent>>,
    /// Handle to the watcher task (dropping this will stop the watcher).
    _task_handle: tokio::task::JoinHandle<()>,
}

impl ConfigWatcherHandle {
    /// Wait for the next config change event.
    pub async fn wait_for_change(&mut self) -> Option<ConfigChangeEvent> {
        // Skip the initial None value
        loop {
            if self.events.changed().await.is_err() {
                return None; // Sender dropped
            }
            let event = self.events.borrow_and_update().clone();
            if event.is_some() {
                return event;
            }
        }
    }
}

/// Starts watching `config_file` for changes.
///
/// Must be called from within a tokio runtime.
pub fn start_config_watcher(
    config_file: &Path,
    config: WatcherConfig,
) -> Result<ConfigWatcherHandle, notify::Error> {
    let (event_tx, event_rx) = watch::channel(None);
    let (notify_tx, notify_rx) = mpsc::channel();

    let dir = match config_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = config_file
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| notify::Error::generic("config path has no file name"))?;

    let mut debouncer = new_debouncer(config.debounce_duration, notify_tx)?;
    if dir.exists() {
        info!("Watching config file: {}", config_file.display());
        debouncer
            .watcher()
            .watch(&dir, notify::RecursiveMode::NonRecursive)?;
    } else {
        warn!(
            "Config directory does not exist, skipping watch: {}",
            dir.display()
        );
    }

    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, event_tx, &file_name);
    });

    Ok(ConfigWatcherHandle {
        events: event_rx,
        _task_handle: task_handle,
    })
}

/// Process events from the notify debouncer and convert to ConfigChangeEvents.
fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    tx: watch::Sender<Option<ConfigChangeEvent>>,
    file_name: &OsString,
) {
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(events)) => {
                if let Some(event) = classify_events(events, file_name) {
                    debug!("Config change detected: {:?}", event);
                    if tx.send(Some(event)).is_err() {
                        info!("Config watcher receiver dropped, stopping");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                if tx.send(Some(ConfigChangeEvent::Error(e.to_string()))).is_err() {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    debug!("Config watcher receiver dropped, stopping");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Config watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Reduce a debounced batch to at most one event for the config file.
fn classify_events(events: Vec<DebouncedEvent>, file_name: &OsString) -> Option<ConfigChangeEvent> {
    events
        .into_iter()
        .filter(|event| {
            matches!(
                event.kind,
                DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
            )
        })
        .find(|event| event.path.file_name() == Some(file_name.as_os_str()))
        .map(|event| ConfigChangeEvent::Changed(event.path))
}
