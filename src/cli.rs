// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `synthesize`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "synthesize",
    version,
    about = "Supervise a flow of triggered shell commands in one terminal session.",
    long_about = None
)]
pub struct CliArgs {
    /// Name of the flow to run (informational; the flow itself comes from
    /// `--config`).
    pub flow_name: String,

    /// Path to the flow file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Synthesize.toml")]
    pub config: String,

    /// Rewrite every `restart`/`watch` trigger to `once` before starting,
    /// then exit once the flow goes quiescent.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SYNTHESIZE_LOG` or a default level is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse and validate the flow, print its nodes/targets/triggers, but
    /// don't start the engine.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
