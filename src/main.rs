//! iniflags - INI config files layered on top of command-line flags.
//!
//! `check` prints the directives of a config source; `demo` runs a sample
//! application whose flags are backed by a config file and reloaded live.

use anyhow::{Context, Result};
use clap::Parser;
use iniflags::cli::check::{CheckArgs, OutputFormat};
use iniflags::cli::demo::DemoArgs;
use iniflags::cli::{Cli, Command};
use iniflags::config::{HttpFetcher, LoadPolicy, read_config_file};
use iniflags::logging::{self, LogTarget};
use iniflags::{FlagRegistry, FlagSet, ParseOutcome, Session, register_control_flags};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    match cli.command {
        Command::Check(args) => run_check(args),
        Command::Demo(args) => run_demo(args),
    }
}

/// Run the check command
fn run_check(args: CheckArgs) -> Result<()> {
    let policy = LoadPolicy {
        allow_missing: args.allow_missing,
        allow_unsecure: args.unsecure,
    };
    let fetcher = HttpFetcher::new().with_timeout(Duration::from_secs(args.timeout));
    let directives = read_config_file(&args.source, &fetcher, policy)
        .with_context(|| format!("Failed to read config source {}", args.source))?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&directives)?);
        }
        OutputFormat::Text => {
            for d in &directives {
                if d.comment.is_empty() {
                    println!("{}:{}: {} = {:?}", d.source, d.line, d.key, d.value);
                } else {
                    println!(
                        "{}:{}: {} = {:?}  # {}",
                        d.source, d.line, d.key, d.value, d.comment
                    );
                }
            }
            println!("{} directive(s)", directives.len());
        }
    }
    Ok(())
}

fn demo_flags() -> Arc<FlagSet> {
    let flags = FlagSet::new("iniflags demo");
    register_control_flags(&flags);
    flags
        .string("addr", ":8080", "TCP address to listen to")
        .string("dbPath", "/tmp/mydb", "Path to the database directory")
        .string("logLevel", "info", "Logging level: debug, info, warn, error")
        .int("cacheSize", 1000, "Maximum number of items in cache")
        .duration("timeout", Duration::from_secs(5), "Connection timeout")
        .bool("debug", false, "Enable debug mode")
        .string("version", "1.0.0", "Application version");
    Arc::new(flags)
}

/// Run the demo command
///
/// Flags are parsed before the async runtime starts, since remote config
/// sources are fetched with a blocking client.
fn run_demo(args: DemoArgs) -> Result<()> {
    let flags = demo_flags();

    let mut session = Session::new(flags.clone());
    // config files only
    session.register_shorthand("l", "logLevel")?;
    // config files and command line
    session.register_command_line_shorthand("v", "version")?;
    {
        let flags = Arc::clone(&flags);
        session.on_flag_change("addr", move |_| {
            println!(
                "Address changed to {}",
                flags.get_string("addr").unwrap_or_default()
            );
        });
    }

    let program = std::env::args().next().unwrap_or_else(|| "iniflags".to_string());
    let argv = std::iter::once(program).chain(args.args);
    let session = match session.parse(argv)? {
        ParseOutcome::Ready(session) => session,
        ParseOutcome::Dump(text) | ParseOutcome::Help(text) => {
            print!("{}", text);
            return Ok(());
        }
    };

    println!("Configuration:");
    for flag in flags.flags() {
        if !iniflags::control::CONTROL_FLAGS.contains(&flag.name.as_str()) {
            println!("  {}: {}", flag.name, flag.value);
        }
    }
    if flags.get_bool("debug") == Some(true) {
        info!("Debug mode enabled");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let reloader = session.start_reloader();
        debug!(state = ?reloader.state(), "Reloader started");
        tokio::signal::ctrl_c().await?;
        let status = reloader.status();
        info!(
            generation = status.generation,
            passes = status.passes,
            "Shutting down"
        );
        Ok::<_, anyhow::Error>(())
    })
}
