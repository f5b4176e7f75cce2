//! Control flags: the command-line switches that configure config loading
//! itself.
//!
//! Every control setting has a `Session` setter. When the registry defines
//! the matching flag, a value from a config file wins over the setter and a
//! value from the command line wins over both. The config source itself is
//! fixed once parsing starts, so `config` is read from the command line only.

use crate::error::{ConfigError, Result};
use crate::registry::{FlagKind, FlagRegistry, FlagSet, FlagValue, parse_duration};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

pub const ALLOW_UNKNOWN_FLAGS: &str = "allowUnknownFlags";
pub const ALLOW_MISSING_CONFIG: &str = "allowMissingConfig";
pub const CONFIG: &str = "config";
pub const CONFIG_UPDATE_INTERVAL: &str = "configUpdateInterval";
pub const DUMP_FLAGS: &str = "dumpflags";
pub const UNSECURE: &str = "unsecure";

/// Names of all control flags.
pub const CONTROL_FLAGS: [&str; 6] = [
    ALLOW_UNKNOWN_FLAGS,
    ALLOW_MISSING_CONFIG,
    CONFIG,
    CONFIG_UPDATE_INTERVAL,
    DUMP_FLAGS,
    UNSECURE,
];

/// Define the control flags on a [`FlagSet`].
pub fn register_control_flags(flags: &FlagSet) {
    flags
        .bool(
            ALLOW_UNKNOWN_FLAGS,
            false,
            "Don't terminate the application if ini file contains unknown flags.",
        )
        .bool(
            ALLOW_MISSING_CONFIG,
            false,
            "Don't terminate the application if the ini file cannot be read.",
        )
        .string(
            CONFIG,
            "",
            "Path to ini config. May be relative to the current executable path.",
        )
        .duration(
            CONFIG_UPDATE_INTERVAL,
            Duration::ZERO,
            "Update interval for re-reading config file set via -config flag. Zero disables config file re-reading.",
        )
        .bool(
            DUMP_FLAGS,
            false,
            "Dumps values for all flags defined in the application into stdout in ini-compatible syntax and terminates the app.",
        )
        .bool(
            UNSECURE,
            false,
            "Allow unsecure communication with the server when loading config file via http.",
        );
}

/// Control flags never appear in a dump.
pub fn default_dump_exclusions() -> BTreeSet<String> {
    CONTROL_FLAGS.iter().map(|name| name.to_string()).collect()
}

/// Settings for config loading and reloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOptions {
    /// Top-level config source; empty means no config file.
    pub config: String,
    pub allow_unknown_flags: bool,
    pub allow_missing_config: bool,
    /// Zero disables periodic reloads.
    pub update_interval: Duration,
    pub allow_unsecure: bool,
    pub dump_flags: bool,
    /// Reload when the local top-level config file changes on disk.
    pub watch_config: bool,
    /// Reload on SIGHUP (unix only).
    pub reload_on_signal: bool,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            config: String::new(),
            allow_unknown_flags: false,
            allow_missing_config: false,
            update_interval: Duration::ZERO,
            allow_unsecure: false,
            dump_flags: false,
            watch_config: false,
            reload_on_signal: true,
        }
    }
}

impl ControlOptions {
    /// Overwrite the settings whose control flag is in `names` with the
    /// flag's current registry value.
    pub fn apply_flags(&mut self, registry: &dyn FlagRegistry, names: &HashSet<String>) -> Result<()> {
        let given = |name: &str| names.contains(name).then(|| registry.value(name)).flatten();

        if let Some(value) = given(CONFIG) {
            self.config = value;
        }
        if let Some(value) = given(CONFIG_UPDATE_INTERVAL) {
            self.update_interval = parse_duration(&value).map_err(|e| {
                ConfigError::CommandLine(format!("-{}: {}", CONFIG_UPDATE_INTERVAL, e))
            })?;
        }
        for (name, slot) in [
            (ALLOW_UNKNOWN_FLAGS, &mut self.allow_unknown_flags),
            (ALLOW_MISSING_CONFIG, &mut self.allow_missing_config),
            (DUMP_FLAGS, &mut self.dump_flags),
            (UNSECURE, &mut self.allow_unsecure),
        ] {
            if let Some(value) = given(name) {
                *slot = parse_bool(name, &value)?;
            }
        }
        Ok(())
    }
}

/// Whether a config file may set control flag `name`.
pub fn settable_from_config(name: &str) -> bool {
    name != CONFIG && CONTROL_FLAGS.contains(&name)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match FlagValue::parse(FlagKind::Bool, value) {
        Ok(FlagValue::Bool(b)) => Ok(b),
        _ => Err(ConfigError::CommandLine(format!(
            "-{}: invalid boolean value [{}]",
            name, value
        ))),
    }
}
