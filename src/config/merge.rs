//! Applying parsed directives to the live flag registry.
//!
//! A pass validates every directive before touching the registry, so a
//! failing pass leaves every flag at its pre-pass value. Flags given on the
//! command line are never overwritten.

use super::parser::Directive;
use crate::control::ALLOW_UNKNOWN_FLAGS;
use crate::error::{ConfigError, Result};
use crate::registry::FlagRegistry;
use crate::shorthand::Shorthands;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{error, warn};

/// One flag whose value changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagChange {
    pub name: String,
    /// Value before the change; `None` when there is no meaningful
    /// previous value, as for the notification sent after the first parse.
    pub previous: Option<String>,
    pub current: String,
}

/// Flags changed by one pass, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: BTreeMap<String, FlagChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.changes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FlagChange> {
        self.changes.get(name)
    }

    /// Value the flag had before the pass.
    pub fn previous(&self, name: &str) -> Option<&str> {
        self.changes.get(name).and_then(|c| c.previous.as_deref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagChange> {
        self.changes.values()
    }

    /// New values keyed by flag name.
    pub fn current_values(&self) -> BTreeMap<&str, &str> {
        self.changes
            .values()
            .map(|c| (c.name.as_str(), c.current.as_str()))
            .collect()
    }

    fn insert(&mut self, change: FlagChange) {
        self.changes.insert(change.name.clone(), change);
    }
}

impl FromIterator<FlagChange> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = FlagChange>>(iter: T) -> Self {
        let mut changes = ChangeSet::default();
        for change in iter {
            changes.insert(change);
        }
        changes
    }
}

/// Everything a merge pass reads besides the directives themselves.
pub struct MergeContext<'a> {
    pub registry: &'a dyn FlagRegistry,
    pub shorthands: &'a Shorthands,
    /// Flags given explicitly on the command line.
    pub protected: &'a HashSet<String>,
    /// Directives naming unknown flags are skipped instead of failing. An
    /// `allowUnknownFlags` directive changes this for the directives after it.
    pub allow_unknown: bool,
}

struct Staged<'d> {
    value: String,
    directive: &'d Directive,
}

/// Apply `directives` in order; a later directive for the same flag wins.
///
/// Returns the flags whose value actually changed, with the value each had
/// before the pass.
pub fn merge_directives(directives: &[Directive], ctx: &MergeContext<'_>) -> Result<ChangeSet> {
    let mut staged: BTreeMap<String, Staged<'_>> = BTreeMap::new();
    let mut first_error: Option<ConfigError> = None;
    let mut allow_unknown = ctx.allow_unknown;

    for directive in directives {
        let Some(name) = resolve_name(&directive.key, ctx) else {
            if allow_unknown {
                warn!(
                    "skipping unknown flag [{}] at line {} of [{}]",
                    directive.key, directive.line, directive.source
                );
                continue;
            }
            warn!(
                "unknown flag name [{}] found at line {} of [{}]",
                directive.key, directive.line, directive.source
            );
            first_error.get_or_insert(ConfigError::UnknownFlag {
                name: directive.key.clone(),
                source_id: directive.source.clone(),
                line: directive.line,
            });
            continue;
        };

        if ctx.protected.contains(&name) {
            continue;
        }

        match ctx.registry.normalize(&name, &directive.value) {
            Ok(value) => {
                if name == ALLOW_UNKNOWN_FLAGS {
                    allow_unknown = value == "true";
                }
                staged.insert(name, Staged { value, directive });
            }
            Err(e) => {
                warn!(
                    "cannot set flag [{}] to [{}] at line {} of [{}]: {}",
                    name, directive.value, directive.line, directive.source, e
                );
                first_error.get_or_insert(set_value_error(&name, directive, e.to_string()));
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    let pending: Vec<(String, Staged<'_>, String)> = staged
        .into_iter()
        .filter_map(|(name, staged)| {
            let previous = ctx.registry.value(&name).unwrap_or_default();
            (previous != staged.value).then_some((name, staged, previous))
        })
        .collect();

    commit(ctx.registry, pending)
}

fn resolve_name(key: &str, ctx: &MergeContext<'_>) -> Option<String> {
    if ctx.registry.contains(key) {
        return Some(key.to_string());
    }
    ctx.shorthands
        .resolve(key)
        .filter(|full| ctx.registry.contains(full))
        .map(str::to_string)
}

/// Store the staged values, restoring already stored ones if the registry
/// rejects a value it accepted during validation.
fn commit(registry: &dyn FlagRegistry, pending: Vec<(String, Staged<'_>, String)>) -> Result<ChangeSet> {
    let mut changes = ChangeSet::default();

    for (name, staged, previous) in pending {
        if let Err(e) = registry.set(&name, &staged.value) {
            for change in changes.iter() {
                if let Some(previous) = &change.previous
                    && let Err(restore) = registry.set(&change.name, previous)
                {
                    error!(
                        "cannot restore flag [{}] to [{}]: {}",
                        change.name, previous, restore
                    );
                }
            }
            return Err(set_value_error(&name, staged.directive, e.to_string()));
        }
        changes.insert(FlagChange {
            name,
            previous: Some(previous),
            current: staged.value,
        });
    }

    Ok(changes)
}

fn set_value_error(name: &str, directive: &Directive, reason: String) -> ConfigError {
    ConfigError::SetValue {
        name: name.to_string(),
        value: directive.value.clone(),
        source_id: directive.source.clone(),
        line: directive.line,
        reason,
    }
}
