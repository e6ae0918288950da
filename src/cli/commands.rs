//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dockhand - declarative container resource reconciler.
#[derive(Parser, Debug)]
#[command(name = "dockhand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "DOCKHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter configuration.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// List the known resource types.
    Types,

    /// Show the action plan for every resource.
    Plan {
        /// Show field-level diff information.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Converge resources to the configuration.
    Apply {
        /// Compute and report without mutating.
        #[arg(long)]
        check: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue with the remaining resources after a failure.
        #[arg(long)]
        continue_on_error: bool,

        /// Only reconcile resources of this kind.
        #[arg(long)]
        kind: Option<String>,
    },

    /// Report drift between the configuration and observed state.
    Diff,

    /// Show observed state of every resource the backend knows.
    Status {
        /// Show observed field values.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Remove every configured resource.
    Destroy {
        /// Compute and report without mutating.
        #[arg(long)]
        check: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue with the remaining resources after a failure.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Manage the backend cache.
    Cache {
        /// Cache subcommand.
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Cache management subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Drop cached state and clear an expired lock.
    Reset {
        /// Clear the lock even if it has not expired (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
