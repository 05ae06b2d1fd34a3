// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every subcommand that runs stages is a manual override of the scheduled
//! trigger: it never needs the OS scheduler and exits with the chain's exit
//! code.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `flowchain`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowchain",
    version,
    about = "Run a fixed chain of batch stages and register its schedule triggers.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Flowchain.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "Flowchain.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWCHAIN_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the whole chain, or the tail of it starting at `--from`.
    Chain {
        /// First stage to run; earlier stages are not touched.
        #[arg(long, value_name = "STAGE")]
        from: Option<String>,
    },

    /// Run a single stage.
    ///
    /// A stage that heads the chain continues down the chain on success
    /// unless `--only` is given.
    Stage {
        /// Stage name as configured under `[stage.<name>]`.
        name: String,

        /// Never continue into later stages.
        #[arg(long)]
        only: bool,
    },

    /// Register (or replace) schedule triggers with the OS scheduler.
    ///
    /// Without arguments every `[trigger.<name>]` is registered.
    Register {
        #[arg(value_name = "TRIGGER")]
        triggers: Vec<String>,
    },

    /// Remove a registered trigger.
    Unregister {
        #[arg(value_name = "TRIGGER")]
        name: String,
    },

    /// Show the most recent run log records.
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
    },

    /// Parse + validate, print the chain and triggers, but don't execute anything.
    Plan,

    /// Watch the configured hotfolder and run the chain for each new manifest.
    Watch,
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
