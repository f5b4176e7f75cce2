//! Short aliases for full flag names.
//!
//! Every alias is honored in config files. Aliases registered as
//! command-line visible are also rewritten in process arguments before the
//! registry sees them, so `-v=2` reaches the registry as `-version=2`.

use crate::error::{ConfigError, Result};
use crate::registry::FlagRegistry;
use std::collections::BTreeMap;

/// One alias and the flag it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShorthandEntry {
    pub alias: String,
    pub full_name: String,
    /// Whether the alias is also rewritten in process arguments.
    pub command_line: bool,
}

/// Registry of flag aliases, keyed by alias.
#[derive(Debug, Clone, Default)]
pub struct Shorthands {
    entries: BTreeMap<String, ShorthandEntry>,
}

impl Shorthands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `alias` for the existing flag `full_name`.
    ///
    /// Fails if the flag is unknown, the alias is taken by another alias,
    /// or the alias is itself a flag name.
    pub fn register(
        &mut self,
        registry: &dyn FlagRegistry,
        alias: &str,
        full_name: &str,
        command_line: bool,
    ) -> Result<()> {
        if alias.is_empty() || alias.starts_with('-') || alias.contains('=') {
            return Err(ConfigError::registration(format!(
                "invalid shorthand name [{}]",
                alias
            )));
        }
        if !registry.contains(full_name) {
            return Err(ConfigError::registration(format!(
                "cannot register shorthand [{}] for non-existing flag [{}]",
                alias, full_name
            )));
        }
        if let Some(existing) = self.entries.get(alias) {
            return Err(ConfigError::registration(format!(
                "shorthand [{}] is already registered for flag [{}]",
                alias, existing.full_name
            )));
        }
        if registry.contains(alias) {
            return Err(ConfigError::registration(format!(
                "shorthand [{}] is already registered as a flag name",
                alias
            )));
        }

        self.entries.insert(
            alias.to_string(),
            ShorthandEntry {
                alias: alias.to_string(),
                full_name: full_name.to_string(),
                command_line,
            },
        );
        Ok(())
    }

    /// Full flag name an alias stands for.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).map(|e| e.full_name.as_str())
    }

    pub fn get(&self, alias: &str) -> Option<&ShorthandEntry> {
        self.entries.get(alias)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ShorthandEntry> {
        self.entries.values()
    }

    /// Rewrite command-line visible aliases to full flag names.
    ///
    /// `args[0]` is the program name and `--`-prefixed tokens are kept as
    /// is. A bare alias (no `=value`) keeps the same token shape, so a
    /// following value argument still belongs to it.
    pub fn rewrite_args(&self, args: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(args.len());
        let mut iter = args.iter();
        if let Some(program) = iter.next() {
            out.push(program.clone());
        }

        for arg in iter {
            out.push(self.rewrite_token(arg).unwrap_or_else(|| arg.clone()));
        }
        out
    }

    fn rewrite_token(&self, arg: &str) -> Option<String> {
        if arg.len() < 2 || !arg.starts_with('-') || arg.starts_with("--") {
            return None;
        }
        let body = &arg[1..];
        let (name, rest) = match body.find('=') {
            Some(idx) => body.split_at(idx),
            None => (body, ""),
        };
        let entry = self.entries.get(name).filter(|e| e.command_line)?;
        Some(format!("-{}{}", entry.full_name, rest))
    }

    /// The "Registered flag shorthands" usage section, or an empty string
    /// when nothing is registered.
    pub fn usage(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }

        let mut by_flag: BTreeMap<&str, (Vec<&str>, bool)> = BTreeMap::new();
        for entry in self.entries.values() {
            let slot = by_flag.entry(entry.full_name.as_str()).or_default();
            slot.0.push(entry.alias.as_str());
            slot.1 |= entry.command_line;
        }
        let width = by_flag.keys().map(|name| name.len()).max().unwrap_or(0);

        let mut out = String::from("\nRegistered flag shorthands:\n");
        for (full_name, (aliases, command_line)) in by_flag {
            out.push_str(&format!(
                "  -{:<width$}  -[{}]{}\n",
                full_name,
                aliases.join(", "),
                if command_line { " (command-line)" } else { "" },
                width = width
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::FlagSet;

    fn registry() -> FlagSet {
        let fs = FlagSet::new("test");
        fs.string("logLevel", "info", "Log level")
            .string("version", "1.0.0", "Version")
            .bool("debug", false, "Debug");
        fs
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_rules() {
        let fs = registry();
        let mut shorthands = Shorthands::new();
        shorthands.register(&fs, "l", "logLevel", false).unwrap();

        let err = shorthands.register(&fs, "x", "missing", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registration);

        let err = shorthands.register(&fs, "l", "version", false).unwrap_err();
        assert!(err.to_string().contains("already registered for flag [logLevel]"));

        let err = shorthands.register(&fs, "debug", "version", false).unwrap_err();
        assert!(err.to_string().contains("already registered as a flag name"));

        assert!(shorthands.register(&fs, "", "version", false).is_err());
        assert_eq!(shorthands.resolve("l"), Some("logLevel"));
        assert_eq!(shorthands.resolve("v"), None);
        assert_eq!(shorthands.len(), 1);
    }

    #[test]
    fn test_rewrite_args() {
        let fs = registry();
        let mut shorthands = Shorthands::new();
        shorthands.register(&fs, "v", "version", true).unwrap();
        shorthands.register(&fs, "l", "logLevel", false).unwrap();

        let rewritten = shorthands.rewrite_args(&args(&[
            "-v", "prog", "-v=2", "-v", "3", "--v=4", "-l=debug", "-", "--", "v", "-debug",
        ]));
        assert_eq!(
            rewritten,
            args(&[
                "-v",
                "prog",
                "-version=2",
                "-version",
                "3",
                "--v=4",
                "-l=debug",
                "-",
                "--",
                "v",
                "-debug"
            ])
        );
    }

    #[test]
    fn test_rewrite_keeps_empty_value() {
        let fs = registry();
        let mut shorthands = Shorthands::new();
        shorthands.register(&fs, "v", "version", true).unwrap();
        assert_eq!(
            shorthands.rewrite_args(&args(&["app", "-v="])),
            args(&["app", "-version="])
        );
        assert!(shorthands.rewrite_args(&[]).is_empty());
    }

    #[test]
    fn test_usage_section() {
        let fs = registry();
        let mut shorthands = Shorthands::new();
        assert_eq!(shorthands.usage(), "");

        shorthands.register(&fs, "v", "version", true).unwrap();
        shorthands.register(&fs, "l", "logLevel", false).unwrap();
        shorthands.register(&fs, "ll", "logLevel", false).unwrap();

        assert_eq!(
            shorthands.usage(),
            "\nRegistered flag shorthands:\n  -logLevel  -[l, ll]\n  -version   -[v] (command-line)\n"
        );
    }
}
