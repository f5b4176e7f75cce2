//! CLI command definitions for the `iniflags` binary.
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod check;
pub mod demo;

use check::CheckArgs;
use clap::{Parser, Subcommand};
use demo::DemoArgs;

/// Inspect INI config files and try out live reloading
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a config source (imports expanded) and print its directives
    Check(CheckArgs),

    /// Run a sample application whose flags are backed by a config file
    Demo(DemoArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use check::OutputFormat;

    #[test]
    fn test_parse_check() {
        let cli = Cli::parse_from(["iniflags", "check", "app.ini", "--format", "json", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.log, "2");
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.source, "app.ini");
        assert_eq!(args.format, OutputFormat::Json);
        assert!(!args.allow_missing);
        assert_eq!(args.timeout, 30);
    }

    #[test]
    fn test_parse_check_timeout() {
        let cli = Cli::parse_from(["iniflags", "check", "https://cfg/app.ini", "--timeout", "5"]);
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.timeout, 5);
        assert_eq!(args.format, OutputFormat::Text);
    }

    #[test]
    fn test_parse_demo_passes_flags_through() {
        let cli = Cli::parse_from([
            "iniflags",
            "--log",
            "off",
            "demo",
            "--",
            "-config=./app.ini",
            "-v",
            "2.0",
        ]);
        assert_eq!(cli.log, "off");
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.args, vec!["-config=./app.ini", "-v", "2.0"]);
    }
}
