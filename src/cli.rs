// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::{ReadinessTarget, WorkerStage};

/// Command-line arguments for `rapid-batch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rapid-batch",
    version,
    about = "Month-by-month, state-chained RAPID/RRR batch orchestration over S3.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `RapidBatch.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "RapidBatch.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RAPID_BATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Override `[batch].bucket`.
    #[arg(long, value_name = "NAME", global = true)]
    pub bucket: Option<String>,

    /// Override `[batch].arch` (selects the compute endpoint).
    #[arg(long, value_name = "ARCH", global = true)]
    pub arch: Option<String>,

    /// Validate config and print the enumerated units without touching S3.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run every unit through its monthly state chain.
    Chain {
        /// Invoke the configured Lambda endpoint instead of the local
        /// routing command.
        #[arg(long)]
        remote: bool,
    },

    /// Trigger remote compute for every pending unit and re-scan until all
    /// are complete.
    Dispatch {
        /// Artifact whose presence marks a unit complete.
        #[arg(long, value_enum, default_value_t = ReadinessTarget::ForcingVolume)]
        readiness: ReadinessTarget,
    },

    /// Act as the compute worker for a single request.
    Work {
        /// Request JSON, or `@path` to read it from a file.
        #[arg(long, value_name = "JSON|@FILE")]
        request: String,

        #[arg(long, value_enum, default_value_t = WorkerStage::Routing)]
        stage: WorkerStage,
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
