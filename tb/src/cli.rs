//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// TaskBreak - goal classification and task breakdown
#[derive(Parser)]
#[command(
    name = "tb",
    about = "Classify goals and break them into dependency-ordered tasks",
    version = env!("CARGO_PKG_VERSION"),
    after_help = after_help(),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one chat turn through all three hooks, with the LLM as host
    Chat {
        /// User message
        text: String,
    },

    /// Classify a goal as Learning or Not Learning
    Classify {
        /// Goal text
        text: String,
    },

    /// Break a goal into consolidated tasks without classification
    Breakdown {
        /// Goal text
        goal: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run extraction over saved model output
    Extract {
        /// File with model output (stdin when omitted)
        file: Option<PathBuf>,

        /// Parse as a consolidation reply instead of a stub list
        #[arg(long)]
        consolidated: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List prompt templates and where each one resolves from
    Prompts,
}

/// Output format for task listings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskbreak")
        .join("logs")
        .join("taskbreak.log")
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}
