//! Demo subcommand for the iniflags CLI
//!
//! Runs a small application whose flags are backed by a config file.

use clap::Args;

/// Arguments for the demo subcommand
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Flags for the demo application, after `--`:
    /// `iniflags demo -- -config=./app.ini -addr=:9090`
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}
