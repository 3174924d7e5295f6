//! Command-line definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and replay recorded sessions.
#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(version)]
#[command(about = "Inspect and replay recorded sessions")]
pub struct Cli {
    /// Replay folder (overrides the configured one)
    #[arg(long, global = true, value_name = "DIR")]
    pub folder: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List recorded sessions, oldest first
    #[command(visible_alias = "ls")]
    List,

    /// Summarise one log: entry count, keys, time span
    Inspect {
        /// Log file, or `latest` for the newest recording
        #[arg(default_value = "latest")]
        target: String,
    },

    /// Print entries in id order
    Dump {
        /// Log file, or `latest` for the newest recording
        #[arg(default_value = "latest")]
        target: String,

        /// Only entries recorded under this key
        #[arg(long)]
        key: Option<String>,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Replay a log with its original pacing
    Play {
        /// Log file, or `latest` for the newest recording
        #[arg(default_value = "latest")]
        target: String,

        /// Topic to subscribe to (repeatable, default: every key in the log)
        #[arg(long = "topic", value_name = "TOPIC")]
        topics: Vec<String>,
    },

    /// Show the active configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Write the active configuration to the config file
    Init,
}
