//! INI config files layered on top of a command-line flag registry.
//!
//! Values come from the command line, then the config file, then flag
//! defaults. Config files may import other files or `http(s)://` sources,
//! and are re-read on an interval, on SIGHUP, on file change or on demand,
//! with per-flag change callbacks.
//!
//! ```no_run
//! use iniflags::{FlagSet, ParseOutcome, Session, register_control_flags};
//! use std::sync::Arc;
//!
//! let flags = Arc::new(FlagSet::new("app"));
//! register_control_flags(&flags);
//! flags.string("addr", ":8080", "TCP address to listen to");
//!
//! let mut session = Session::new(flags.clone());
//! session.set_config_file("app.ini");
//! match session.parse(std::env::args()).unwrap() {
//!     ParseOutcome::Ready(_session) => println!("addr = {:?}", flags.get_string("addr")),
//!     ParseOutcome::Dump(text) | ParseOutcome::Help(text) => print!("{}", text),
//! }
//! ```

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod paths;
pub mod registry;
pub mod reload;
pub mod session;
pub mod shorthand;
pub mod subscriptions;

pub use config::{ChangeSet, Directive, FlagChange, SourceFetcher, read_config_file};
pub use control::{ControlOptions, register_control_flags};
pub use error::{ConfigError, ErrorKind, Result};
pub use registry::{FlagRegistry, FlagSet};
pub use reload::{ReloadOutcome, ReloadStatus, ReloadTrigger, ReloaderHandle, ReloaderState};
pub use session::{ParseOutcome, ParsedSession, Session};
pub use shorthand::Shorthands;
pub use subscriptions::FlagChangeCallback;
