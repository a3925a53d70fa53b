// src/cli.rs

//! CLI argument parsing using `clap` (derive feature).

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `critpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "critpipe",
    version,
    about = "Run the criticality-score collection pipeline and its task scheduler.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Critpipe.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Critpipe.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CRITPIPE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one round of the collection/scoring workflow.
    Run {
        /// Round identifier; ends up in log file names and stage environments.
        #[arg(long, value_name = "N", default_value_t = 0)]
        round: u64,

        /// Treat every stage as stale, even when its own predicate says no.
        #[arg(long)]
        force: bool,

        /// Print the computed build sequence without executing any stage.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the task scheduler and a pool of workers draining per-repository jobs.
    Drain {
        /// Number of concurrent workers; overrides `[worker].count`.
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
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
