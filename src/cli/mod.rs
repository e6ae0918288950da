//! CLI module for the Dockhand reconciler.
//!
//! This module provides the command-line interface for planning and
//! applying declared resources.

mod commands;
mod output;

pub use commands::{CacheCommands, Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
