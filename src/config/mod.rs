//! Config file reading and merging.
//!
//! The pipeline for one pass:
//! 1. **Decode** - bytes to UTF-8 lines, BOM stripped ([`decoder`])
//! 2. **Parse** - lines to ordered directives, imports spliced in place
//!    ([`parser`], [`loader`])
//! 3. **Merge** - directives applied to the flag registry, command-line
//!    values protected ([`merge`])
//!
//! [`dump`] renders the registry back into this format and [`watcher`]
//! reports edits of the top-level file.

pub mod decoder;
pub mod dump;
pub mod loader;
pub mod merge;
pub mod parser;
pub mod watcher;

pub use dump::{dump_flags, escape_usage};
pub use loader::{HttpFetcher, LoadPolicy, SourceFetcher, SourceLoader, read_config_file};
pub use merge::{ChangeSet, FlagChange, MergeContext, merge_directives};
pub use parser::{Directive, quote_value};
pub use watcher::{ConfigChangeEvent, ConfigWatcherHandle, WatcherConfig, start_config_watcher};
