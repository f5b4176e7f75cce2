//! Per-flag change callbacks.
//!
//! Callbacks are keyed by flag name. After the first parse every callback
//! runs once; after each reload only the callbacks of changed flags run.
//! Callbacks for the same flag run in registration order.

use crate::config::{ChangeSet, FlagChange};
use crate::registry::FlagRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Callback invoked with the change of the flag it was registered for.
pub type FlagChangeCallback = Arc<dyn Fn(&FlagChange) + Send + Sync>;

/// Manages change callbacks for registered flags.
///
/// Thread-safe: uses an internal `Mutex` so it can be shared between the
/// application and the reload worker without requiring `&mut self`.
/// Callbacks are cloned out of the lock before they run, so a callback may
/// register further callbacks.
#[derive(Default)]
pub struct FlagSubscriptions {
    callbacks: Mutex<HashMap<String, Vec<FlagChangeCallback>>>,
}

impl FlagSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<FlagChangeCallback>>> {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a callback for `name`. Existence of the flag is not checked here.
    pub fn subscribe(&self, name: &str, callback: FlagChangeCallback) {
        self.lock().entry(name.to_string()).or_default().push(callback);
    }

    /// Flag names that have at least one callback, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn callbacks_for(&self, name: &str) -> Vec<FlagChangeCallback> {
        self.lock().get(name).cloned().unwrap_or_default()
    }

    /// Run every callback once, with the current value of its flag.
    ///
    /// `initial` supplies the previous value of flags the first pass
    /// changed. Returns the number of callbacks invoked.
    pub fn notify_all(&self, registry: &dyn FlagRegistry, initial: &ChangeSet) -> usize {
        let mut invoked = 0;
        for name in self.names() {
            let Some(current) = registry.value(&name) else {
                continue;
            };
            let change = FlagChange {
                previous: initial.previous(&name).map(str::to_string),
                name: name.clone(),
                current,
            };
            invoked += self.dispatch(&change);
        }
        invoked
    }

    /// Run the callbacks of every flag in `changes`.
    ///
    /// Returns the number of callbacks invoked.
    pub fn notify(&self, changes: &ChangeSet) -> usize {
        changes.iter().map(|change| self.dispatch(change)).sum()
    }

    fn dispatch(&self, change: &FlagChange) -> usize {
        let callbacks = self.callbacks_for(&change.name);
        if !callbacks.is_empty() {
            debug!(flag = %change.name, callbacks = callbacks.len(), "running flag change callbacks");
        }
        for callback in &callbacks {
            callback(change);
        }
        callbacks.len()
    }
}

impl std::fmt::Debug for FlagSubscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagSubscriptions")
            .field("flags", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FlagSet;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> FlagChangeCallback {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Arc::new(move |change: &FlagChange| {
            log.lock()
                .unwrap()
                .push(format!("{}:{}={}", tag, change.name, change.current));
        })
    }

    #[test]
    fn test_notify_all_runs_every_callback() {
        let fs = FlagSet::new("test");
        fs.string("a", "1", "").string("b", "2", "");
        let log = Arc::new(Mutex::new(Vec::new()));

        let subs = FlagSubscriptions::new();
        assert!(subs.names().is_empty());
        subs.subscribe("a", recorder(&log, "first"));
        subs.subscribe("a", recorder(&log, "second"));
        subs.subscribe("b", recorder(&log, "b"));

        assert_eq!(subs.notify_all(&fs, &ChangeSet::default()), 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:a=1", "second:a=1", "b:b=2"]
        );
    }

    #[test]
    fn test_notify_only_changed_flags() {
        let fs = FlagSet::new("test");
        fs.string("a", "1", "").string("b", "2", "");
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs = FlagSubscriptions::new();
        subs.subscribe("a", recorder(&log, "a"));
        subs.subscribe("b", recorder(&log, "b"));

        assert_eq!(subs.notify(&ChangeSet::default()), 0);
        assert!(log.lock().unwrap().is_empty());

        let changes: ChangeSet = [FlagChange {
            name: "b".to_string(),
            previous: Some("2".to_string()),
            current: "3".to_string(),
        }]
        .into_iter()
        .collect();
        assert_eq!(subs.notify(&changes), 1);
        assert_eq!(*log.lock().unwrap(), vec!["b:b=3"]);
    }

    #[test]
    fn test_callback_may_subscribe() {
        let fs = FlagSet::new("test");
        fs.string("a", "1", "");
        let subs = Arc::new(FlagSubscriptions::new());
        let inner = Arc::clone(&subs);
        subs.subscribe(
            "a",
            Arc::new(move |_: &FlagChange| inner.subscribe("a", Arc::new(|_: &FlagChange| {}))),
        );

        assert_eq!(subs.notify_all(&fs, &ChangeSet::default()), 1);
        assert_eq!(subs.notify_all(&fs, &ChangeSet::default()), 2);
    }
}
