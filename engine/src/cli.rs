//! CLI interface for Valet
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for talking to the assistant
//! and inspecting the conversation store.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Valet multi-agent assistant
///
/// Routes your questions to specialized capability agents (weather, web
/// search) and keeps every conversation in a local SQLite store.
#[derive(Parser, Debug)]
#[command(name = "valet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive chat session
    Chat {
        /// Fold recent context from this earlier session into the conversation
        #[arg(long, value_name = "SESSION_ID")]
        resume: Option<String>,
    },

    /// Ask a single question and exit
    Ask {
        /// The question to ask
        query: String,
    },

    /// Show conversation history
    History {
        /// Session to show (defaults to the most recently active one)
        #[arg(short, long)]
        session: Option<String>,

        /// Number of messages to show (0 = all)
        #[arg(short, long, default_value = "0")]
        limit: u32,
    },

    /// List recent conversation sessions
    Sessions {
        /// Lookback window in days
        #[arg(short, long, default_value = "7")]
        days: u32,

        /// Maximum number of sessions to list
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show conversation store statistics
    Stats,

    /// Delete messages older than the retention window
    Cleanup {
        /// Delete messages older than this many days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_parses() {
        let cli = Cli::try_parse_from(["valet", "ask", "what is the weather in Tokyo"]).unwrap();
        match cli.command {
            Command::Ask { query } => assert_eq!(query, "what is the weather in Tokyo"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_history_defaults() {
        let cli = Cli::try_parse_from(["valet", "history"]).unwrap();
        match cli.command {
            Command::History { session, limit } => {
                assert_eq!(session, None);
                assert_eq!(limit, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_json_flag() {
        let cli = Cli::try_parse_from(["valet", "stats", "--json"]).unwrap();
        assert!(cli.json);
    }
}
