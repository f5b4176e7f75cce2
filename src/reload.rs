//! Background config reloading.
//!
//! One worker task owns reloading. Every trigger source (the interval
//! timer, SIGHUP, the config file watcher and manual requests) sends a
//! [`ReloadRequest`] into its channel; the worker runs one pass at a time
//! on the blocking pool, so passes never interleave.

use crate::config::{ChangeSet, ConfigChangeEvent, WatcherConfig, start_config_watcher};
use crate::error::ErrorKind;
use crate::paths::is_http;
use crate::session::ParsedSession;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REQUEST_QUEUE: usize = 16;

/// How often a paused timer checks for a non-zero interval again.
const PAUSED_TIMER_POLL: Duration = Duration::from_secs(1);

/// What asked for a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    Timer,
    Signal,
    FileChanged(PathBuf),
    Manual,
}

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloaderState {
    /// Waiting for external triggers only.
    Idle,
    /// Waiting, with the interval timer armed.
    Scheduled,
    /// A pass is running.
    Triggered,
}

/// Result of one reload pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The pass succeeded and no flag changed.
    Unchanged,
    Applied { generation: u64, changes: ChangeSet },
    /// No flag changed. `kind` is `None` when the pass itself panicked.
    Failed {
        kind: Option<ErrorKind>,
        message: String,
    },
}

/// Summary of the reloads so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadStatus {
    pub generation: u64,
    pub passes: u64,
    pub last_applied: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct ReloadRequest {
    trigger: ReloadTrigger,
    reply: Option<oneshot::Sender<ReloadOutcome>>,
}

/// Handle to the running reload tasks. Dropping it stops them.
pub struct ReloaderHandle {
    requests: mpsc::Sender<ReloadRequest>,
    state: watch::Receiver<ReloaderState>,
    status: Arc<Mutex<ReloadStatus>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReloaderHandle {
    /// Run a pass now and wait for its outcome.
    ///
    /// Returns `None` if the worker has stopped.
    pub async fn request_reload(&self) -> Option<ReloadOutcome> {
        let (reply, outcome) = oneshot::channel();
        let request = ReloadRequest {
            trigger: ReloadTrigger::Manual,
            reply: Some(reply),
        };
        self.requests.send(request).await.ok()?;
        outcome.await.ok()
    }

    /// Queue a pass without waiting. Returns `false` if the queue is full
    /// or the worker has stopped.
    pub fn trigger(&self, trigger: ReloadTrigger) -> bool {
        self.requests
            .try_send(ReloadRequest {
                trigger,
                reply: None,
            })
            .is_ok()
    }

    pub fn state(&self) -> ReloaderState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ReloaderState> {
        self.state.clone()
    }

    pub fn status(&self) -> ReloadStatus {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for ReloaderHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl ParsedSession {
    /// Start the reload worker and its trigger sources.
    ///
    /// Must be called from within a tokio runtime. The interval timer runs
    /// only when the update interval is non-zero at this point, and re-reads
    /// the interval before every sleep, so a config file can change it.
    /// SIGHUP is honored on unix unless disabled. The file watcher runs only
    /// when enabled and the config source is a local file.
    pub fn start_reloader(&self) -> ReloaderHandle {
        let options = self.options();
        let timer = !options.update_interval.is_zero();
        let idle_state = idle_state(self, timer);

        let (requests, receiver) = mpsc::channel(REQUEST_QUEUE);
        let (state_tx, state_rx) = watch::channel(idle_state);
        let status = Arc::new(Mutex::new(ReloadStatus {
            generation: self.generation(),
            ..Default::default()
        }));

        let mut tasks = vec![tokio::spawn(run_worker(
            self.clone(),
            receiver,
            state_tx,
            timer,
            Arc::clone(&status),
        ))];

        if timer {
            info!("Reloading config every {:?}", options.update_interval);
            tasks.push(tokio::spawn(run_timer(self.clone(), requests.clone())));
        }

        if options.reload_on_signal {
            tasks.push(spawn_signal_listener(requests.clone()));
        }

        if options.watch_config {
            match self.config_source() {
                Some(source) if !is_http(source) => {
                    if let Some(task) = spawn_file_watcher(Path::new(source), requests.clone()) {
                        tasks.push(task);
                    }
                }
                Some(source) => warn!("Cannot watch remote config source [{}]", source),
                None => debug!("No config file to watch"),
            }
        }

        ReloaderHandle {
            requests,
            state: state_rx,
            status,
            tasks,
        }
    }
}

/// State between passes: `Scheduled` while the timer has an interval.
fn idle_state(session: &ParsedSession, timer: bool) -> ReloaderState {
    if timer && !session.options().update_interval.is_zero() {
        ReloaderState::Scheduled
    } else {
        ReloaderState::Idle
    }
}

async fn run_worker(
    session: ParsedSession,
    mut receiver: mpsc::Receiver<ReloadRequest>,
    state: watch::Sender<ReloaderState>,
    timer: bool,
    status: Arc<Mutex<ReloadStatus>>,
) {
    while let Some(request) = receiver.recv().await {
        state.send_replace(ReloaderState::Triggered);
        debug!(trigger = ?request.trigger, "Reloading config");

        let pass = session.clone();
        let outcome = match tokio::task::spawn_blocking(move || pass.reload()).await {
            Ok(Ok(changes)) if changes.is_empty() => ReloadOutcome::Unchanged,
            Ok(Ok(changes)) => ReloadOutcome::Applied {
                generation: session.generation(),
                changes,
            },
            Ok(Err(e)) => ReloadOutcome::Failed {
                kind: Some(e.kind()),
                message: e.to_string(),
            },
            Err(e) => {
                warn!("Config reload pass aborted: {}", e);
                ReloadOutcome::Failed {
                    kind: None,
                    message: e.to_string(),
                }
            }
        };

        {
            let mut status = status.lock().unwrap_or_else(|e| e.into_inner());
            status.passes += 1;
            status.generation = session.generation();
            match &outcome {
                ReloadOutcome::Applied { .. } => {
                    status.last_applied = Some(Utc::now());
                    status.last_error = None;
                }
                ReloadOutcome::Unchanged => status.last_error = None,
                ReloadOutcome::Failed { message, .. } => status.last_error = Some(message.clone()),
            }
        }
        state.send_replace(idle_state(&session, timer));

        if let Some(reply) = request.reply {
            let _ = reply.send(outcome);
        }
    }
    debug!("Config reload worker stopped");
}

/// Sleep for the current update interval, reload, repeat. A zero interval
/// pauses the timer until a later pass sets a non-zero one.
async fn run_timer(session: ParsedSession, requests: mpsc::Sender<ReloadRequest>) {
    loop {
        let interval = session.options().update_interval;
        if interval.is_zero() {
            tokio::time::sleep(PAUSED_TIMER_POLL).await;
            continue;
        }
        tokio::time::sleep(interval).await;
        let (reply, done) = oneshot::channel();
        let request = ReloadRequest {
            trigger: ReloadTrigger::Timer,
            reply: Some(reply),
        };
        if requests.send(request).await.is_err() || done.await.is_err() {
            return;
        }
    }
}

#[cfg(unix)]
fn spawn_signal_listener(requests: mpsc::Sender<ReloadRequest>) -> JoinHandle<()> {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("Cannot listen for SIGHUP: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading config");
            let request = ReloadRequest {
                trigger: ReloadTrigger::Signal,
                reply: None,
            };
            if requests.send(request).await.is_err() {
                return;
            }
        }
    })
}

#[cfg(not(unix))]
fn spawn_signal_listener(_requests: mpsc::Sender<ReloadRequest>) -> JoinHandle<()> {
    debug!("SIGHUP reloading is only available on unix");
    tokio::spawn(async {})
}

fn spawn_file_watcher(path: &Path, requests: mpsc::Sender<ReloadRequest>) -> Option<JoinHandle<()>> {
    let mut watcher = match start_config_watcher(path, WatcherConfig::default()) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!("Failed to start config file watcher: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while let Some(event) = watcher.wait_for_change().await {
            let path = match event {
                ConfigChangeEvent::Changed(path) => path,
                ConfigChangeEvent::Error(e) => {
                    warn!("Config file watcher error: {}", e);
                    continue;
                }
            };
            info!("Config file changed: {}", path.display());
            let request = ReloadRequest {
                trigger: ReloadTrigger::FileChanged(path),
                reply: None,
            };
            if requests.send(request).await.is_err() {
                return;
            }
        }
    }))
}
