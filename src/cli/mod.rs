//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Record and read agent coordination events on Solana
///
/// Handoffs and completions are written as memo transactions signed by the
/// configured wallet, and read back from any address's history.
#[derive(Parser, Debug)]
#[command(name = "agentpact")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the standard locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON-RPC endpoint (overrides config and environment)
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Solana CLI keypair file used for signing
    #[arg(long, global = true)]
    pub keypair: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record that one agent handed a task to another
    Handoff {
        /// Agent giving up the task
        from: String,
        /// Agent receiving the task
        to: String,
        /// Task description
        task: String,
    },

    /// Record that an agent finished a task
    Complete {
        /// Agent that did the work
        agent: String,
        /// Task description
        task: String,
        /// Outcome summary
        result: String,
    },

    /// Show the events recorded by an address
    History {
        /// Base58 address; defaults to the configured local signer
        identity: Option<String>,

        /// Signatures to scan per page
        #[arg(short, long)]
        limit: Option<usize>,

        /// Resume below this signature
        #[arg(long)]
        before: Option<String>,

        /// Walk this many pages backwards
        #[arg(long, default_value_t = 1)]
        pages: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the payload an event would carry, without publishing
    Inspect {
        #[command(subcommand)]
        event: InspectCommand,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        cmd: Option<ConfigCommand>,
    },
}

#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Encode a handoff event
    Handoff { from: String, to: String, task: String },
    /// Encode a completion event
    Completion { agent: String, task: String, result: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Print where the config file is read from
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_history_flags() {
        let cli = Cli::try_parse_from([
            "agentpact",
            "history",
            "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
            "--limit",
            "20",
            "--pages",
            "3",
            "--json",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::History { identity, limit, pages, json, before } => {
                assert!(identity.is_some());
                assert_eq!(limit, Some(20));
                assert_eq!(pages, 3);
                assert!(json);
                assert!(before.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_handoff_requires_three_args() {
        assert!(Cli::try_parse_from(["agentpact", "handoff", "Kevin", "Clawd"]).is_err());
        assert!(Cli::try_parse_from(["agentpact", "handoff", "Kevin", "Clawd", "task", "--rpc-url", "http://localhost:8899"]).is_ok());
    }
}
