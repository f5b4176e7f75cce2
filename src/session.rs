//! The config session: everything configured before the first parse, and
//! the live state after it.
//!
//! [`Session`] collects settings, shorthands and callbacks. [`Session::parse`]
//! consumes it, so parsing twice or registering shorthands after parsing
//! does not compile. The resulting [`ParsedSession`] is cheap to clone and
//! is what the reload worker drives.

use crate::config::{
    ChangeSet, Directive, FlagChange, HttpFetcher, LoadPolicy, MergeContext, SourceFetcher,
    SourceLoader, dump_flags, merge_directives,
};
use crate::control::{ControlOptions, default_dump_exclusions, settable_from_config};
use crate::error::{ConfigError, Result};
use crate::paths::resolve_config_path;
use crate::registry::{CommandLineError, FlagRegistry};
use crate::shorthand::Shorthands;
use crate::subscriptions::{FlagChangeCallback, FlagSubscriptions};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of [`Session::parse`].
#[derive(Debug)]
pub enum ParseOutcome {
    /// Flags are loaded; the application should run.
    Ready(ParsedSession),
    /// Dump was requested: the rendered flags, to be printed before exiting.
    Dump(String),
    /// `-h`/`-help` was given: the usage text, to be printed before exiting.
    Help(String),
}

/// Pre-parse configuration of config loading.
pub struct Session {
    registry: Arc<dyn FlagRegistry>,
    options: ControlOptions,
    shorthands: Shorthands,
    subscriptions: FlagSubscriptions,
    dump_exclusions: BTreeSet<String>,
    fetcher: Arc<dyn SourceFetcher>,
}

impl Session {
    pub fn new(registry: Arc<dyn FlagRegistry>) -> Self {
        Self {
            registry,
            options: ControlOptions::default(),
            shorthands: Shorthands::new(),
            subscriptions: FlagSubscriptions::new(),
            dump_exclusions: default_dump_exclusions(),
            fetcher: Arc::new(HttpFetcher::new()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn FlagRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &ControlOptions {
        &self.options
    }

    /// Top-level config source; empty disables config loading.
    pub fn set_config_file(&mut self, path: impl Into<String>) -> &mut Self {
        self.options.config = path.into();
        self
    }

    pub fn set_allow_missing_config(&mut self, allow: bool) -> &mut Self {
        self.options.allow_missing_config = allow;
        self
    }

    pub fn set_allow_unknown_flags(&mut self, allow: bool) -> &mut Self {
        self.options.allow_unknown_flags = allow;
        self
    }

    /// Zero disables periodic reloads.
    pub fn set_config_update_interval(&mut self, interval: Duration) -> &mut Self {
        self.options.update_interval = interval;
        self
    }

    pub fn set_allow_unsecure(&mut self, allow: bool) -> &mut Self {
        self.options.allow_unsecure = allow;
        self
    }

    pub fn set_dump_flags(&mut self, dump: bool) -> &mut Self {
        self.options.dump_flags = dump;
        self
    }

    pub fn set_watch_config(&mut self, watch: bool) -> &mut Self {
        self.options.watch_config = watch;
        self
    }

    pub fn set_reload_on_signal(&mut self, reload: bool) -> &mut Self {
        self.options.reload_on_signal = reload;
        self
    }

    /// Replace the fetcher used for `http(s)://` sources.
    pub fn with_fetcher(&mut self, fetcher: Arc<dyn SourceFetcher>) -> &mut Self {
        self.fetcher = fetcher;
        self
    }

    /// Leave `name` out of flag dumps.
    pub fn exclude_flag_from_dump(&mut self, name: &str) -> &mut Self {
        self.dump_exclusions.insert(name.to_string());
        self
    }

    /// Let config files use `alias` in place of `full_name`.
    pub fn register_shorthand(&mut self, alias: &str, full_name: &str) -> Result<()> {
        self.shorthands
            .register(self.registry.as_ref(), alias, full_name, false)
    }

    /// Like [`register_shorthand`](Self::register_shorthand), and also accept
    /// `-alias` on the command line.
    pub fn register_command_line_shorthand(&mut self, alias: &str, full_name: &str) -> Result<()> {
        self.shorthands
            .register(self.registry.as_ref(), alias, full_name, true)
    }

    /// Register a callback for `name`. The flag is checked when parsing.
    pub fn on_flag_change<F>(&mut self, name: &str, callback: F) -> &mut Self
    where
        F: Fn(&FlagChange) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(name, Arc::new(callback));
        self
    }

    /// Flag usage followed by the registered shorthands.
    pub fn usage(&self) -> String {
        format!("{}{}", self.registry.usage(), self.shorthands.usage())
    }

    /// Consume the process arguments, then load the config file.
    ///
    /// `args` includes the program name. Flags given on the command line
    /// keep their values through this and every later reload. Control flags
    /// set by the config file take effect from the next directive on
    /// (`allowUnknownFlags`) or the next pass (the others).
    pub fn parse<I, S>(self, args: I) -> Result<ParseOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let args = self.shorthands.rewrite_args(&args);
        let program = args.first().cloned().unwrap_or_default();

        match self
            .registry
            .parse_command_line(args.get(1..).unwrap_or_default())
        {
            Ok(()) => {}
            Err(CommandLineError::HelpRequested) => return Ok(ParseOutcome::Help(self.usage())),
            Err(CommandLineError::Invalid(message)) => {
                return Err(ConfigError::CommandLine(message));
            }
        }

        let protected = self.registry.explicitly_set();
        let mut options = self.options;
        options.apply_flags(self.registry.as_ref(), &protected)?;

        let source = if options.config.is_empty() {
            None
        } else {
            let resolved = resolve_config_path(&program, &options.config)
                .map_err(|e| ConfigError::CommandLine(format!("-config: {}", e)))?;
            Some(resolved)
        };

        let pipeline = Pipeline {
            registry: Arc::clone(&self.registry),
            shorthands: self.shorthands,
            protected,
            source,
            controls: Mutex::new(Controls {
                options: options.clone(),
                from_config: HashSet::new(),
            }),
            base_options: options,
            fetcher: self.fetcher,
        };
        let initial = pipeline.run_pass()?;
        debug!(
            source = pipeline.source.as_deref().unwrap_or(""),
            changed = initial.len(),
            "initial config pass done"
        );

        if pipeline.options().dump_flags {
            return Ok(ParseOutcome::Dump(dump_flags(
                self.registry.as_ref(),
                &self.dump_exclusions,
            )));
        }

        for name in self.subscriptions.names() {
            if !self.registry.contains(&name) {
                return Err(unknown_callback_flag(&name));
            }
        }

        let session = ParsedSession {
            shared: Arc::new(Shared {
                pipeline,
                subscriptions: self.subscriptions,
                dump_exclusions: self.dump_exclusions,
                generation: AtomicU64::new(1),
                pass_lock: Mutex::new(()),
            }),
        };
        session
            .shared
            .subscriptions
            .notify_all(session.registry().as_ref(), &initial);
        Ok(ParseOutcome::Ready(session))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("shorthands", &self.shorthands)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

fn unknown_callback_flag(name: &str) -> ConfigError {
    ConfigError::registration(format!(
        "cannot register flag change callback for non-existing flag [{}]",
        name
    ))
}

/// What one pass needs: where to read from and how to apply it.
struct Pipeline {
    registry: Arc<dyn FlagRegistry>,
    shorthands: Shorthands,
    protected: HashSet<String>,
    source: Option<String>,
    /// Setter values with command-line control flags applied.
    base_options: ControlOptions,
    controls: Mutex<Controls>,
    fetcher: Arc<dyn SourceFetcher>,
}

/// Control settings in effect.
struct Controls {
    options: ControlOptions,
    /// Control flags a config file has set so far.
    from_config: HashSet<String>,
}

impl Pipeline {
    fn options(&self) -> ControlOptions {
        self.controls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .options
            .clone()
    }

    fn run_pass(&self) -> Result<ChangeSet> {
        let Some(source) = &self.source else {
            return Ok(ChangeSet::default());
        };
        let options = self.options();
        let policy = LoadPolicy {
            allow_missing: options.allow_missing_config,
            allow_unsecure: options.allow_unsecure,
        };
        let directives = SourceLoader::new(self.fetcher.as_ref(), policy).load(source)?;
        let changes = merge_directives(
            &directives,
            &MergeContext {
                registry: self.registry.as_ref(),
                shorthands: &self.shorthands,
                protected: &self.protected,
                allow_unknown: options.allow_unknown_flags,
            },
        )?;
        self.update_controls(&directives)?;
        Ok(changes)
    }

    /// Pick up control flags set by `directives`, which were just applied.
    fn update_controls(&self, directives: &[Directive]) -> Result<()> {
        let mut controls = self.controls.lock().unwrap_or_else(|e| e.into_inner());
        for directive in directives {
            let name = match self.shorthands.resolve(&directive.key) {
                Some(full) if !self.registry.contains(&directive.key) => full,
                _ => directive.key.as_str(),
            };
            if settable_from_config(name) && !self.protected.contains(name) {
                controls.from_config.insert(name.to_string());
            }
        }
        if controls.from_config.is_empty() {
            return Ok(());
        }

        let mut options = self.base_options.clone();
        options.apply_flags(self.registry.as_ref(), &controls.from_config)?;
        if options != controls.options {
            debug!(?options, "control flags updated from config");
            controls.options = options;
        }
        Ok(())
    }
}

struct Shared {
    pipeline: Pipeline,
    subscriptions: FlagSubscriptions,
    dump_exclusions: BTreeSet<String>,
    generation: AtomicU64,
    /// Serializes passes and their generation bumps.
    pass_lock: Mutex<()>,
}

/// Live config state after the first successful parse.
#[derive(Clone)]
pub struct ParsedSession {
    shared: Arc<Shared>,
}

impl ParsedSession {
    pub fn registry(&self) -> &Arc<dyn FlagRegistry> {
        &self.shared.pipeline.registry
    }

    /// Settings in effect: setters, overridden by control flags from the
    /// config file, overridden by control flags from the command line.
    pub fn options(&self) -> ControlOptions {
        self.shared.pipeline.options()
    }

    /// The resolved top-level config source, if any.
    pub fn config_source(&self) -> Option<&str> {
        self.shared.pipeline.source.as_deref()
    }

    /// Starts at 1 after the first parse and grows by one per reload that
    /// changed at least one flag.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Register a callback for an existing flag. It runs on the next reload
    /// that changes the flag.
    pub fn on_flag_change<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(&FlagChange) + Send + Sync + 'static,
    {
        if !self.registry().contains(name) {
            return Err(unknown_callback_flag(name));
        }
        let callback: FlagChangeCallback = Arc::new(callback);
        self.shared.subscriptions.subscribe(name, callback);
        Ok(())
    }

    /// Re-read the config source and apply it.
    ///
    /// Blocking: remote sources are fetched synchronously. On failure no
    /// flag changes and the generation stays the same. Callbacks run before
    /// this returns and must not call `reload` themselves.
    pub fn reload(&self) -> Result<ChangeSet> {
        let _guard = self
            .shared
            .pass_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let changes = match self.shared.pipeline.run_pass() {
            Ok(changes) => changes,
            Err(e) => {
                warn!("Failed to reload config, keeping current flag values: {}", e);
                return Err(e);
            }
        };
        if changes.is_empty() {
            return Ok(changes);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            generation,
            "Read updated config. Modified flags are: {:?}",
            changes.current_values()
        );
        self.shared.subscriptions.notify(&changes);
        Ok(changes)
    }

    /// Current values in config file syntax, excluded flags left out.
    pub fn dump(&self) -> String {
        dump_flags(self.registry().as_ref(), &self.shared.dump_exclusions)
    }
}

impl std::fmt::Debug for ParsedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedSession")
            .field("source", &self.config_source())
            .field("generation", &self.generation())
            .field("options", &self.options())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::register_control_flags;
    use crate::error::ErrorKind;
    use crate::registry::FlagSet;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn flags() -> Arc<FlagSet> {
        let fs = FlagSet::new("app");
        register_control_flags(&fs);
        fs.string("addr", ":8080", "TCP address to listen to")
            .string("logLevel", "info", "Logging level")
            .string("version", "1.0.0", "Application version")
            .int("cacheSize", 1000, "Cache size");
        Arc::new(fs)
    }

    fn ready(outcome: ParseOutcome) -> ParsedSession {
        match outcome {
            ParseOutcome::Ready(session) => session,
            other => panic!("expected a ready session, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_without_config() {
        let fs = flags();
        let session = ready(Session::new(fs.clone()).parse(["app", "-addr=:1"]).unwrap());
        assert_eq!(session.generation(), 1);
        assert_eq!(session.config_source(), None);
        assert_eq!(fs.get_string("addr").unwrap(), ":1");
        assert!(session.reload().unwrap().is_empty());
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn test_command_line_beats_config_beats_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "addr = :9090\nlogLevel = debug\n").unwrap();

        let fs = flags();
        let mut session = Session::new(fs.clone());
        session.set_config_file(path.to_str().unwrap());
        let session = ready(session.parse(["app", "-logLevel=warn"]).unwrap());

        assert_eq!(fs.get_string("addr").unwrap(), ":9090");
        assert_eq!(fs.get_string("logLevel").unwrap(), "warn");
        assert_eq!(fs.get_int("cacheSize"), Some(1000));

        fs::write(&path, "addr = :7070\nlogLevel = error\n").unwrap();
        let changes = session.reload().unwrap();
        assert_eq!(changes.names().collect::<Vec<_>>(), vec!["addr"]);
        assert_eq!(fs.get_string("logLevel").unwrap(), "warn");
        assert_eq!(session.generation(), 2);
    }

    #[test]
    fn test_config_flag_on_command_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "cacheSize = 5\n").unwrap();

        let fs = flags();
        let arg = format!("-config={}", path.display());
        let session = ready(Session::new(fs.clone()).parse(["app", arg.as_str()]).unwrap());
        assert_eq!(fs.get_int("cacheSize"), Some(5));
        assert_eq!(session.config_source(), Some(path.to_str().unwrap()));
    }

    #[test]
    fn test_missing_config() {
        let fs = flags();
        let mut session = Session::new(fs.clone());
        session.set_config_file("/nonexistent/iniflags/app.ini");
        let err = session.parse(["app"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSource);

        let mut session = Session::new(flags());
        session
            .set_config_file("/nonexistent/iniflags/app.ini")
            .set_allow_missing_config(true);
        assert!(matches!(session.parse(["app"]).unwrap(), ParseOutcome::Ready(_)));
    }

    #[test]
    fn test_callbacks_after_parse_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "addr = :9090\n").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let version_calls = Arc::new(AtomicUsize::new(0));
        let mut session = Session::new(flags());
        session.set_config_file(path.to_str().unwrap());
        {
            let calls = Arc::clone(&calls);
            session.on_flag_change("addr", move |change| {
                assert_eq!(change.name, "addr");
                calls.fetch_add(1, Ordering::SeqCst);
            });
            let version_calls = Arc::clone(&version_calls);
            session.on_flag_change("version", move |_| {
                version_calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        let session = ready(session.parse(["app"]).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(version_calls.load(Ordering::SeqCst), 1);

        fs::write(&path, "addr = :9091\n").unwrap();
        session.reload().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(version_calls.load(Ordering::SeqCst), 1);

        // unchanged file: nothing fires
        session.reload().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_for_unknown_flag() {
        let mut session = Session::new(flags());
        session.on_flag_change("nope", |_| {});
        let err = session.parse(["app"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registration);

        let session = ready(Session::new(flags()).parse(["app"]).unwrap());
        assert!(session.on_flag_change("nope", |_| {}).is_err());
        assert!(session.on_flag_change("addr", |_| {}).is_ok());
    }

    #[test]
    fn test_failed_reload_keeps_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "addr = :9090\n").unwrap();

        let fs = flags();
        let mut session = Session::new(fs.clone());
        session.set_config_file(path.to_str().unwrap());
        let session = ready(session.parse(["app"]).unwrap());

        fs::write(&path, "addr = :1\ncacheSize = many\n").unwrap();
        let err = session.reload().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SetValue);
        assert_eq!(fs.get_string("addr").unwrap(), ":9090");
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn test_dump_outcome() {
        let fs = flags();
        let outcome = Session::new(fs)
            .parse(["app", "-dumpflags", "-addr=:1"])
            .unwrap();
        let ParseOutcome::Dump(dump) = outcome else {
            panic!("expected a dump");
        };
        assert!(dump.contains("addr = :1  # TCP address to listen to\n"));
        assert!(!dump.contains("dumpflags"));
        assert!(!dump.contains("configUpdateInterval"));
    }

    #[test]
    fn test_help_includes_shorthands() {
        let mut session = Session::new(flags());
        session.register_shorthand("l", "logLevel").unwrap();
        let outcome = session.parse(["app", "-h"]).unwrap();
        let ParseOutcome::Help(usage) = outcome else {
            panic!("expected help");
        };
        assert!(usage.contains("-addr string"));
        assert!(usage.contains("Registered flag shorthands:"));
    }

    #[test]
    fn test_command_line_shorthand() {
        let fs = flags();
        let mut session = Session::new(fs.clone());
        session.register_command_line_shorthand("v", "version").unwrap();
        session.register_shorthand("l", "logLevel").unwrap();
        ready(session.parse(["app", "-v", "2.0.0"]).unwrap());
        assert_eq!(fs.get_string("version").unwrap(), "2.0.0");

        let mut session = Session::new(flags());
        session.register_shorthand("l", "logLevel").unwrap();
        let err = session.parse(["app", "-l=debug"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandLine);
    }

    #[test]
    fn test_invalid_command_line() {
        let err = Session::new(flags()).parse(["app", "-cacheSize=x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandLine);
    }
}
