//! CLI module for StreamLens.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// StreamLens - streaming-video telemetry analytics assistant
///
/// Routes natural-language questions to SQL-backed analytics subagents and
/// streams their answers as newline-delimited JSON.
#[derive(Parser, Debug)]
#[command(name = "streamlens")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP invocation server
    Serve {
        /// Host to bind to (defaults to server.host from config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to server.port from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single invocation and print the NDJSON stream
    Invoke {
        /// The question to ask
        prompt: String,

        /// Conversation session id
        #[arg(short, long)]
        session: Option<String>,

        /// User id
        #[arg(short, long)]
        user: Option<String>,

        /// IANA timezone name used when rendering prompts
        #[arg(short, long)]
        timezone: Option<String>,

        /// Number of previous user turns to load from memory
        #[arg(long)]
        last_k: Option<usize>,
    },

    /// Inspect captured SQL audit records
    Audit {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Show only records for this correlation id
        #[arg(long)]
        id: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value (dotted key, e.g. model.model)
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
    },

    /// Show configuration file path
    Path,
}
