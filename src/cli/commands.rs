use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `DhammaShell` - a mindful terminal assistant.
#[derive(Parser, Debug)]
#[command(name = "ds")]
#[command(author = "kusalatech")]
#[command(version)]
#[command(about = "A mindful, compassionate terminal assistant.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive mindful chat session
    Chat {
        /// Skip the compassion check before each message
        #[arg(long)]
        calm: bool,
    },

    /// Score a piece of text for compassionate wording
    Check {
        /// Text to score
        text: String,
    },

    /// Print the conversation ledger as JSON
    Export,

    /// Replace the conversation ledger with a JSON export
    Import {
        /// Path to a file produced by `ds export`
        file: PathBuf,
    },

    /// Inspect alignment and health
    Audit {
        #[command(subcommand)]
        audit_command: AuditCommands,
    },

    /// Manage the stored API key
    Config {
        /// Store this `OpenRouter` API key in the config file
        #[arg(long, conflicts_with = "clear")]
        api_key: Option<String>,

        /// Remove the stored API key
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// Score recent chat history for alignment
    Alignment {
        /// Only consider the last N hours
        #[arg(long)]
        hours: Option<i64>,

        /// Also write the report to the reports directory
        #[arg(long)]
        save: bool,
    },

    /// Show the health monitor configuration and counters
    Health,
}
