//! In-process flag registry with `-name=value` command-line handling.

use super::duration::{format_duration, parse_duration};
use super::{CommandLineError, FlagInfo, FlagRegistry, FlagValueError};
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::warn;

/// Value type of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    String,
    Bool,
    Int,
    Uint,
    Float,
    Duration,
}

impl FlagKind {
    fn type_name(&self) -> &'static str {
        match self {
            FlagKind::String => "string",
            FlagKind::Bool => "bool",
            FlagKind::Int => "int",
            FlagKind::Uint => "uint",
            FlagKind::Float => "float",
            FlagKind::Duration => "duration",
        }
    }
}

/// A typed flag value.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    String(String),
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Duration(Duration),
}

impl FlagValue {
    pub fn kind(&self) -> FlagKind {
        match self {
            FlagValue::String(_) => FlagKind::String,
            FlagValue::Bool(_) => FlagKind::Bool,
            FlagValue::Int(_) => FlagKind::Int,
            FlagValue::Uint(_) => FlagKind::Uint,
            FlagValue::Float(_) => FlagKind::Float,
            FlagValue::Duration(_) => FlagKind::Duration,
        }
    }

    /// Parse `raw` as a value of the given kind.
    pub fn parse(kind: FlagKind, raw: &str) -> Result<Self, FlagValueError> {
        let bad = |reason: &str| FlagValueError::new(format!("parse error: {}", reason));
        match kind {
            FlagKind::String => Ok(FlagValue::String(raw.to_string())),
            FlagKind::Bool => match raw {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(FlagValue::Bool(true)),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(FlagValue::Bool(false)),
                _ => Err(bad("invalid syntax")),
            },
            FlagKind::Int => raw
                .parse::<i64>()
                .map(FlagValue::Int)
                .map_err(|e| bad(&e.to_string())),
            FlagKind::Uint => raw
                .parse::<u64>()
                .map(FlagValue::Uint)
                .map_err(|e| bad(&e.to_string())),
            FlagKind::Float => raw
                .parse::<f64>()
                .map(FlagValue::Float)
                .map_err(|e| bad(&e.to_string())),
            FlagKind::Duration => parse_duration(raw)
                .map(FlagValue::Duration)
                .map_err(|e| bad(&e)),
        }
    }

    /// Canonical string form, as reported by the registry.
    pub fn render(&self) -> String {
        match self {
            FlagValue::String(s) => s.clone(),
            FlagValue::Bool(b) => b.to_string(),
            FlagValue::Int(i) => i.to_string(),
            FlagValue::Uint(u) => u.to_string(),
            FlagValue::Float(f) => f.to_string(),
            FlagValue::Duration(d) => format_duration(*d),
        }
    }
}

#[derive(Debug, Clone)]
struct Flag {
    usage: String,
    default: FlagValue,
    value: FlagValue,
}

#[derive(Debug, Default)]
struct Inner {
    flags: BTreeMap<String, Flag>,
    explicit: HashSet<String>,
    args: Vec<String>,
}

/// A set of named, typed flags.
///
/// Thread-safe: values live behind an internal `RwLock` so the set can be
/// shared through an `Arc` between the application and the reload worker.
#[derive(Debug)]
pub struct FlagSet {
    name: String,
    inner: RwLock<Inner>,
}

impl FlagSet {
    /// Create an empty flag set. `name` is used in usage output.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Define a flag with a typed default. Redefining a flag keeps the
    /// original definition.
    pub fn define(&self, name: &str, default: FlagValue, usage: &str) -> &Self {
        let mut inner = self.write();
        if inner.flags.contains_key(name) {
            warn!("flag redefined: {}", name);
            return self;
        }
        inner.flags.insert(
            name.to_string(),
            Flag {
                usage: usage.to_string(),
                default: default.clone(),
                value: default,
            },
        );
        self
    }

    pub fn string(&self, name: &str, default: &str, usage: &str) -> &Self {
        self.define(name, FlagValue::String(default.to_string()), usage)
    }

    pub fn bool(&self, name: &str, default: bool, usage: &str) -> &Self {
        self.define(name, FlagValue::Bool(default), usage)
    }

    pub fn int(&self, name: &str, default: i64, usage: &str) -> &Self {
        self.define(name, FlagValue::Int(default), usage)
    }

    pub fn uint(&self, name: &str, default: u64, usage: &str) -> &Self {
        self.define(name, FlagValue::Uint(default), usage)
    }

    pub fn float(&self, name: &str, default: f64, usage: &str) -> &Self {
        self.define(name, FlagValue::Float(default), usage)
    }

    pub fn duration(&self, name: &str, default: Duration, usage: &str) -> &Self {
        self.define(name, FlagValue::Duration(default), usage)
    }

    /// Typed value of a flag.
    pub fn get(&self, name: &str) -> Option<FlagValue> {
        self.read().flags.get(name).map(|flag| flag.value.clone())
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).map(|value| value.render())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            FlagValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FlagValue::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn get_uint(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            FlagValue::Uint(u) => Some(u),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            FlagValue::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn get_duration(&self, name: &str) -> Option<Duration> {
        match self.get(name)? {
            FlagValue::Duration(d) => Some(d),
            _ => None,
        }
    }

    /// Positional arguments left over after the last parsed flag.
    pub fn args(&self) -> Vec<String> {
        self.read().args.clone()
    }

    /// Parse one flag token. Returns `Ok(false)` when flag parsing is done.
    fn parse_one(
        inner: &mut Inner,
        args: &[String],
        pos: &mut usize,
    ) -> Result<bool, CommandLineError> {
        let Some(arg) = args.get(*pos) else {
            return Ok(false);
        };
        if arg.len() < 2 || !arg.starts_with('-') {
            return Ok(false);
        }
        let mut name = &arg[1..];
        if let Some(stripped) = name.strip_prefix('-') {
            if stripped.is_empty() {
                // "--" terminates the flags
                *pos += 1;
                return Ok(false);
            }
            name = stripped;
        }
        if name.is_empty() || name.starts_with('-') || name.starts_with('=') {
            return Err(CommandLineError::Invalid(format!(
                "bad flag syntax: {}",
                arg
            )));
        }
        *pos += 1;

        let (name, inline_value) = match name.split_once('=') {
            Some((n, v)) => (n, Some(v.to_string())),
            None => (name, None),
        };

        let Some(flag) = inner.flags.get_mut(name) else {
            if name == "help" || name == "h" {
                return Err(CommandLineError::HelpRequested);
            }
            return Err(CommandLineError::Invalid(format!(
                "flag provided but not defined: -{}",
                name
            )));
        };

        let kind = flag.value.kind();
        let raw = match (kind, inline_value) {
            (_, Some(v)) => v,
            (FlagKind::Bool, None) => "true".to_string(),
            (_, None) => {
                let Some(next) = args.get(*pos) else {
                    return Err(CommandLineError::Invalid(format!(
                        "flag needs an argument: -{}",
                        name
                    )));
                };
                *pos += 1;
                next.clone()
            }
        };

        flag.value = FlagValue::parse(kind, &raw).map_err(|e| {
            CommandLineError::Invalid(format!(
                "invalid value \"{}\" for flag -{}: {}",
                raw, name, e
            ))
        })?;
        inner.explicit.insert(name.to_string());
        Ok(true)
    }
}

impl FlagRegistry for FlagSet {
    fn lookup(&self, name: &str) -> Option<FlagInfo> {
        self.read().flags.get(name).map(|flag| FlagInfo {
            name: name.to_string(),
            value: flag.value.render(),
            usage: flag.usage.clone(),
        })
    }

    fn normalize(&self, name: &str, raw: &str) -> Result<String, FlagValueError> {
        let inner = self.read();
        let flag = inner
            .flags
            .get(name)
            .ok_or_else(|| FlagValueError::new(format!("no such flag -{}", name)))?;
        FlagValue::parse(flag.value.kind(), raw).map(|value| value.render())
    }

    fn set(&self, name: &str, raw: &str) -> Result<(), FlagValueError> {
        let mut inner = self.write();
        let flag = inner
            .flags
            .get_mut(name)
            .ok_or_else(|| FlagValueError::new(format!("no such flag -{}", name)))?;
        flag.value = FlagValue::parse(flag.value.kind(), raw)?;
        Ok(())
    }

    fn flags(&self) -> Vec<FlagInfo> {
        self.read()
            .flags
            .iter()
            .map(|(name, flag)| FlagInfo {
                name: name.clone(),
                value: flag.value.render(),
                usage: flag.usage.clone(),
            })
            .collect()
    }

    fn explicitly_set(&self) -> HashSet<String> {
        self.read().explicit.clone()
    }

    fn parse_command_line(&self, args: &[String]) -> Result<(), CommandLineError> {
        let mut inner = self.write();
        let mut pos = 0;
        while Self::parse_one(&mut inner, args, &mut pos)? {}
        inner.args = args[pos.min(args.len())..].to_vec();
        Ok(())
    }

    fn usage(&self) -> String {
        let inner = self.read();
        let mut out = format!("Usage of {}:\n", self.name);
        for (name, flag) in &inner.flags {
            let kind = flag.default.kind();
            if kind == FlagKind::Bool {
                out.push_str(&format!("  -{}\n", name));
            } else {
                out.push_str(&format!("  -{} {}\n", name, kind.type_name()));
            }
            out.push_str(&format!("    \t{}", flag.usage.replace('\n', "\n    \t")));
            let default = flag.default.render();
            let is_zero = match &flag.default {
                FlagValue::String(s) => s.is_empty(),
                FlagValue::Bool(b) => !b,
                FlagValue::Int(i) => *i == 0,
                FlagValue::Uint(u) => *u == 0,
                FlagValue::Float(f) => *f == 0.0,
                FlagValue::Duration(d) => d.is_zero(),
            };
            if !is_zero {
                if kind == FlagKind::String {
                    out.push_str(&format!(" (default {:?})", default));
                } else {
                    out.push_str(&format!(" (default {})", default));
                }
            }
            out.push('\n');
        }
        out
    }
}
