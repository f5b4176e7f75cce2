//! Source identifier resolution.
//!
//! A config source is identified by a string: either a local filesystem
//! path or an `http://`/`https://` URL. Imports are resolved against the
//! identifier of the importing source:
//! - remote base: RFC 3986 reference resolution
//! - remote or absolute import path: used unchanged
//! - otherwise: joined to the directory of the base and cleaned
//!
//! Pure string manipulation, no filesystem I/O.

use std::path::{Component, Path, PathBuf};
use url::Url;

/// Whether the identifier is an `http://` or `https://` URL.
pub fn is_http(id: &str) -> bool {
    let lower = id.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Whether the identifier is an `https://` URL.
pub fn is_secure(id: &str) -> bool {
    id.to_ascii_lowercase().starts_with("https://")
}

/// Resolve `rel` against the source identified by `base`.
pub fn resolve_import(base: &str, rel: &str) -> Result<String, String> {
    if is_http(base) {
        let base_url = Url::parse(base)
            .map_err(|e| format!("error when parsing http base path [{}]: {}", base, e))?;
        let resolved = base_url.join(rel).map_err(|e| {
            format!(
                "error when parsing http rel path [{}] for base [{}]: {}",
                rel, base, e
            )
        })?;
        return Ok(resolved.to_string());
    }

    if rel.is_empty() || is_http(rel) || rel.starts_with('/') || Path::new(rel).is_absolute() {
        return Ok(rel.to_string());
    }

    let dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    Ok(clean_path(&dir.join(rel)))
}

/// Resolve the top-level config path given on the command line.
///
/// Paths starting with `./` are taken relative to the working directory;
/// other relative paths are relative to the directory of the executable.
pub fn resolve_config_path(program: &str, config: &str) -> Result<String, String> {
    if config.starts_with("./") {
        return Ok(config.to_string());
    }
    resolve_import(program, config)
}

/// Lexically clean a path: drop `.` segments and fold `name/..` pairs.
pub fn clean_path(path: &Path) -> String {
    let cleaned = normalize_path_components(path);
    let text = cleaned.to_string_lossy().into_owned();
    if text.is_empty() { ".".to_string() } else { text }
}

fn normalize_path_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(Component::ParentDir),
            },
        }
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_http() {
        assert!(is_http("http://example.com/a.ini"));
        assert!(is_http("HTTPS://example.com/a.ini"));
        assert!(!is_http("./http.ini"));
        assert!(is_secure("https://x"));
        assert!(!is_secure("http://x"));
    }

    #[test]
    fn test_relative_to_base_directory() {
        assert_eq!(resolve_import("conf/app.ini", "base.ini").unwrap(), "conf/base.ini");
        assert_eq!(resolve_import("app.ini", "base.ini").unwrap(), "base.ini");
        assert_eq!(
            resolve_import("conf/sub/app.ini", "../common/base.ini").unwrap(),
            "conf/common/base.ini"
        );
        assert_eq!(resolve_import("./app.ini", "./base.ini").unwrap(), "base.ini");
    }

    #[test]
    fn test_absolute_and_remote_unchanged() {
        assert_eq!(resolve_import("conf/app.ini", "/etc/app.ini").unwrap(), "/etc/app.ini");
        assert_eq!(
            resolve_import("conf/app.ini", "https://cfg.example.com/a.ini").unwrap(),
            "https://cfg.example.com/a.ini"
        );
        assert_eq!(resolve_import("conf/app.ini", "").unwrap(), "");
    }

    #[test]
    fn test_remote_base() {
        assert_eq!(
            resolve_import("https://cfg.example.com/env/app.ini", "base.ini").unwrap(),
            "https://cfg.example.com/env/base.ini"
        );
        assert_eq!(
            resolve_import("https://cfg.example.com/env/app.ini", "../common.ini").unwrap(),
            "https://cfg.example.com/common.ini"
        );
        assert_eq!(
            resolve_import("https://cfg.example.com/env/app.ini", "/root.ini").unwrap(),
            "https://cfg.example.com/root.ini"
        );
        assert_eq!(
            resolve_import("https://a.example.com/app.ini", "http://b.example.com/x.ini").unwrap(),
            "http://b.example.com/x.ini"
        );
    }

    #[test]
    fn test_config_path() {
        assert_eq!(resolve_config_path("/usr/bin/app", "app.ini").unwrap(), "/usr/bin/app.ini");
        assert_eq!(resolve_config_path("/usr/bin/app", "./app.ini").unwrap(), "./app.ini");
        assert_eq!(resolve_config_path("app", "app.ini").unwrap(), "app.ini");
        assert_eq!(resolve_config_path("/usr/bin/app", "").unwrap(), "");
        assert_eq!(resolve_config_path("/usr/bin/app", "/etc/app.ini").unwrap(), "/etc/app.ini");
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("a/./b/../c")), "a/c");
        assert_eq!(clean_path(Path::new("../x")), "../x");
        assert_eq!(clean_path(Path::new("/../x")), "/x");
        assert_eq!(clean_path(Path::new("a/..")), ".");
    }
}
