//! Config source loading with recursive import expansion.
//!
//! Opens local files or fetches remote sources, decodes and parses them, and
//! splices `#import`ed sources in place. The chain of sources currently being
//! parsed is passed down the recursion to detect import cycles.

use super::decoder::LineDecoder;
use super::parser::{Directive, parse_lines};
use crate::error::{ConfigError, Result};
use crate::paths::{clean_path, is_http, is_secure, resolve_import};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Retrieves the raw bytes of a remote config source.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `http(s)://` sources with a blocking HTTP client.
///
/// Must not be called from inside an async context; the reload worker runs
/// passes on the blocking pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConfigError::fetch(url, e))?;
        let response = client.get(url).send().map_err(|e| ConfigError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::fetch(
                url,
                format!("unexpected http status code {}", status.as_u16()),
            ));
        }
        let body = response.bytes().map_err(|e| ConfigError::fetch(url, e))?;
        Ok(body.to_vec())
    }
}

/// Settings that decide how sources are opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadPolicy {
    /// Unreadable or unreachable sources contribute nothing instead of
    /// failing the pass.
    pub allow_missing: bool,
    /// Plain `http://` sources may be fetched.
    pub allow_unsecure: bool,
}

/// Loads one top-level source and everything it imports.
pub struct SourceLoader<'a> {
    fetcher: &'a dyn SourceFetcher,
    policy: LoadPolicy,
}

impl<'a> SourceLoader<'a> {
    pub fn new(fetcher: &'a dyn SourceFetcher, policy: LoadPolicy) -> Self {
        Self { fetcher, policy }
    }

    /// Parse `source_id` into its ordered directives, imports expanded.
    pub fn load(&self, source_id: &str) -> Result<Vec<Directive>> {
        let source_id = if is_http(source_id) {
            source_id.to_string()
        } else {
            clean_path(Path::new(source_id))
        };
        self.load_chain(&source_id, &[])
    }

    fn load_chain(&self, source_id: &str, chain: &[String]) -> Result<Vec<Directive>> {
        if chain.iter().any(|id| id == source_id) {
            warn!("import recursion found for [{}]: {:?}", source_id, chain);
            return Err(ConfigError::CyclicImport {
                source_id: source_id.to_string(),
                chain: chain.to_vec(),
            });
        }
        let mut chain = chain.to_vec();
        chain.push(source_id.to_string());

        let reader = match self.open(source_id) {
            Ok(reader) => reader,
            Err(e) if self.policy.allow_missing && e.is_unavailable_source() => {
                debug!("skipping unavailable config source: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        debug!(source = source_id, depth = chain.len(), "parsing config source");
        let lines = LineDecoder::new(reader, source_id);
        parse_lines(lines, source_id, |path, line| {
            let resolved = resolve_import(source_id, path)
                .map_err(|reason| ConfigError::syntax(source_id, line, reason))?;
            debug!(from = source_id, import = %resolved, "importing config source");
            self.load_chain(&resolved, &chain)
        })
    }

    fn open(&self, source_id: &str) -> Result<Box<dyn BufRead>> {
        if is_http(source_id) {
            if !is_secure(source_id) {
                if !self.policy.allow_unsecure {
                    warn!(
                        "cannot load config file at [{}]: unsecure communication is not allowed",
                        source_id
                    );
                    return Err(ConfigError::fetch(
                        source_id,
                        "unsecure communication is not allowed",
                    ));
                }
                warn!("unsecure communication with the server at [{}]", source_id);
            }
            let bytes = self.fetcher.fetch(source_id)?;
            return Ok(Box::new(Cursor::new(bytes)));
        }

        let file = File::open(source_id).map_err(|source| ConfigError::MissingSource {
            path: PathBuf::from(source_id),
            source,
        })?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a single config source into directives without applying them.
pub fn read_config_file(
    source_id: &str,
    fetcher: &dyn SourceFetcher,
    policy: LoadPolicy,
) -> Result<Vec<Directive>> {
    SourceLoader::new(fetcher, policy).load(source_id)
}
