//! Structured error types for parsing, merging and registration.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error kinds for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Source errors
    Encoding,
    Syntax,
    CyclicImport,
    Fetch,
    MissingSource,
    Io,

    // Merge errors
    UnknownFlag,
    SetValue,

    // Usage errors
    Registration,
    CommandLine,
}

/// Errors produced while reading config sources or applying them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid UTF-8 encoding at line {line} of [{source_id}]")]
    Encoding { source_id: String, line: usize },

    #[error("{message} at line {line} of [{source_id}]")]
    Syntax {
        source_id: String,
        line: usize,
        message: String,
    },

    #[error("import recursion found for [{source_id}]: {}", chain.join(" -> "))]
    CyclicImport {
        source_id: String,
        chain: Vec<String>,
    },

    #[error("cannot load config source [{url}]: {reason}")]
    Fetch { url: String, reason: String },

    #[error("cannot open config file [{}]: {source}", path.display())]
    MissingSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading [{source_id}]: {source}")]
    Io {
        source_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown flag name [{name}] found at line {line} of [{source_id}]")]
    UnknownFlag {
        name: String,
        source_id: String,
        line: usize,
    },

    #[error(
        "cannot set flag [{name}] to [{value}] at line {line} of [{source_id}]: {reason}"
    )]
    SetValue {
        name: String,
        value: String,
        source_id: String,
        line: usize,
        reason: String,
    },

    #[error("{0}")]
    Registration(String),

    #[error("invalid command line: {0}")]
    CommandLine(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Encoding { .. } => ErrorKind::Encoding,
            ConfigError::Syntax { .. } => ErrorKind::Syntax,
            ConfigError::CyclicImport { .. } => ErrorKind::CyclicImport,
            ConfigError::Fetch { .. } => ErrorKind::Fetch,
            ConfigError::MissingSource { .. } => ErrorKind::MissingSource,
            ConfigError::Io { .. } => ErrorKind::Io,
            ConfigError::UnknownFlag { .. } => ErrorKind::UnknownFlag,
            ConfigError::SetValue { .. } => ErrorKind::SetValue,
            ConfigError::Registration(_) => ErrorKind::Registration,
            ConfigError::CommandLine(_) => ErrorKind::CommandLine,
        }
    }

    // Convenience constructors

    pub fn syntax(source_id: &str, line: usize, message: impl Into<String>) -> Self {
        ConfigError::Syntax {
            source_id: source_id.to_string(),
            line,
            message: message.into(),
        }
    }

    pub fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        ConfigError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn registration(message: impl Into<String>) -> Self {
        ConfigError::Registration(message.into())
    }

    /// Whether this error means a source could not be opened at all, as
    /// opposed to being opened and found malformed.
    pub fn is_unavailable_source(&self) -> bool {
        matches!(
            self,
            ConfigError::Fetch { .. } | ConfigError::MissingSource { .. }
        )
    }
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ConfigError::syntax("a.ini", 3, "cannot split [x] into key and value");
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(
            err.to_string(),
            "cannot split [x] into key and value at line 3 of [a.ini]"
        );

        let err = ConfigError::registration("nope");
        assert_eq!(err.kind(), ErrorKind::Registration);
    }

    #[test]
    fn test_cyclic_import_message_lists_chain() {
        let err = ConfigError::CyclicImport {
            source_id: "a.ini".into(),
            chain: vec!["a.ini".into(), "b.ini".into()],
        };
        assert_eq!(
            err.to_string(),
            "import recursion found for [a.ini]: a.ini -> b.ini"
        );
    }

    #[test]
    fn test_unavailable_source() {
        assert!(ConfigError::fetch("http://x/a.ini", "status 404").is_unavailable_source());
        assert!(!ConfigError::syntax("a.ini", 1, "bad").is_unavailable_source());
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::CyclicImport).unwrap();
        assert_eq!(json, "\"CYCLIC_IMPORT\"");
    }
}
