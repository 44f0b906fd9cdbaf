//! Command-line interface definition for burrow-poller
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to poll continuously, poll once, and check configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// burrow-poller - Kafka consumer lag poller for Burrow
///
/// Periodically walks Burrow's clusters, consumer groups and lag reports,
/// writing one JSON record per consumer group.
#[derive(Parser, Debug, Clone)]
#[command(name = "burrow-poller")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "BURROW_CONFIG", default_value = "config/burrow.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll on the configured schedule until interrupted
    Run {
        /// Append records to this file instead of writing to STDOUT
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a single poll cycle and exit
    Once {
        /// Append records to this file instead of writing to STDOUT
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration and print the normalized request
    Check,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: "config/burrow.yaml".to_string(),
            verbose: false,
            command: Commands::Check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, "config/burrow.yaml");
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from(["burrow-poller", "run"]).unwrap();
        match cli.command {
            Commands::Run { output } => assert!(output.is_none()),
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_run_with_output() {
        let cli = Cli::try_parse_from(["burrow-poller", "run", "--output", "lag.jsonl"]).unwrap();
        match cli.command {
            Commands::Run { output } => assert_eq!(output, Some(PathBuf::from("lag.jsonl"))),
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_once() {
        let cli = Cli::try_parse_from(["burrow-poller", "once", "-o", "out.jsonl"]).unwrap();
        assert!(matches!(cli.command, Commands::Once { output: Some(_) }));
    }

    #[test]
    fn test_cli_parse_check_with_config_and_verbose() {
        let cli =
            Cli::try_parse_from(["burrow-poller", "--config", "custom.yaml", "-v", "check"]).unwrap();
        assert_eq!(cli.config, "custom.yaml");
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["burrow-poller"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["burrow-poller", "chat"]).is_err());
    }
}
