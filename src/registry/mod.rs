//! The flag registry capability that config files are layered on top of.
//!
//! The registry owns flag definitions, their typed values and the record of
//! which flags were given on the command line. This crate only talks to it
//! through [`FlagRegistry`]; [`FlagSet`] is the bundled implementation.

mod duration;
mod flagset;

pub use duration::{format_duration, parse_duration};
pub use flagset::{FlagKind, FlagSet, FlagValue};

use std::collections::HashSet;
use thiserror::Error;

/// A snapshot of one registered flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagInfo {
    pub name: String,
    /// Current value in its canonical string form.
    pub value: String,
    pub usage: String,
}

/// The registry rejected a value as malformed for the flag's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FlagValueError(pub String);

impl FlagValueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The registry could not consume the process arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandLineError {
    #[error("help requested")]
    HelpRequested,
    #[error("{0}")]
    Invalid(String),
}

/// Capability surface of a command-line flag registry.
///
/// Implementations use interior mutability: the registry is shared between
/// the application (reading values) and the reload worker (setting them).
pub trait FlagRegistry: Send + Sync {
    /// Look a flag up by its full name.
    fn lookup(&self, name: &str) -> Option<FlagInfo>;

    /// Current canonical string value of a flag.
    fn value(&self, name: &str) -> Option<String> {
        self.lookup(name).map(|flag| flag.value)
    }

    fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Validate `raw` for the named flag without storing it.
    ///
    /// Returns the canonical string the flag would report after
    /// `set(name, raw)`.
    fn normalize(&self, name: &str, raw: &str) -> Result<String, FlagValueError>;

    /// Parse and store a new value for the named flag.
    fn set(&self, name: &str, raw: &str) -> Result<(), FlagValueError>;

    /// All registered flags, ordered by name.
    fn flags(&self) -> Vec<FlagInfo>;

    /// Names of the flags that were given explicitly on the command line.
    fn explicitly_set(&self) -> HashSet<String>;

    /// Consume process arguments (without the program name).
    fn parse_command_line(&self, args: &[String]) -> Result<(), CommandLineError>;

    /// Human-readable description of every flag.
    fn usage(&self) -> String;
}
