//! CLI interface for the kiosk
//!
//! Defined with clap's derive API: global output/config/log flags plus the
//! kiosk commands.

use clap::{Parser, Subcommand};
use kiosk_sdk::types::MemoryStatus;
use std::path::PathBuf;

/// Speech kiosk conversation orchestrator
///
/// Runs the push-to-talk conversation loop for an after-school kiosk and
/// manages what it has been allowed to remember.
#[derive(Parser, Debug)]
#[command(name = "kiosk")]
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
    /// Run the kiosk on the console, reading staff commands from stdin
    Run {
        /// Use stub providers instead of the configured ones
        #[arg(long)]
        stub: bool,
    },

    /// Feed a JSON-lines event log through the orchestrator
    Replay {
        /// File with one `{"now_ms": .., "event": {..}}` object per line
        file: PathBuf,
    },

    /// Review remembered items
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Remove expired memory items now
    Housekeeping,

    /// Check the database and provider reachability
    Doctor,
}

/// Memory review actions
#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// List memory items
    List {
        /// Only items for this child
        #[arg(long)]
        name: Option<String>,

        /// Only items with this status (pending, confirmed, rejected, deleted)
        #[arg(long)]
        status: Option<MemoryStatus>,
    },

    /// Confirm a pending item so it is kept
    Confirm { id: String },

    /// Reject a pending item
    Reject { id: String },

    /// Delete an item
    Delete { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_list_filters() {
        let cli = Cli::try_parse_from([
            "kiosk", "--json", "memory", "list", "--name", "ゆうた", "--status", "pending",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Memory {
                action: MemoryAction::List { name, status },
            } => {
                assert_eq!(name.as_deref(), Some("ゆうた"));
                assert_eq!(status, Some(MemoryStatus::Pending));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["kiosk", "memory", "list", "--status", "archived"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["kiosk", "run", "--stub", "--log", "debug"]).unwrap();
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Run { stub: true }));
    }
}
