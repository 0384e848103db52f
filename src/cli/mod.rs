//! CLI module for microgpt.

pub mod commands;
mod conversation;
mod output;
pub mod preflight;

pub use conversation::Conversation;
pub use output::Output;

use clap::{Parser, Subcommand};

/// microgpt - an assistant for analysing 3D microstructure data
///
/// Talks to a hosted assistant that can call local tools: tortuosity
/// simulation, dataset search and filtering, and Python script execution.
#[derive(Parser, Debug)]
#[command(name = "microgpt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "MICROGPT_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive conversation
    Chat,

    /// Send a single message and print the reply
    Ask {
        /// The message to send
        message: String,
    },

    /// Analyse every TIFF image in a directory
    Analyze {
        /// Directory holding the images
        #[arg(default_value = "./data")]
        directory: String,
    },

    /// Check external tools and configuration
    Doctor,

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

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "poll.timeout_secs")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze_default_directory() {
        let cli = Cli::parse_from(["microgpt", "-vv", "analyze"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Analyze { directory } => assert_eq!(directory, "./data"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::parse_from(["microgpt", "config", "set", "poll.timeout_secs", "60"]);
        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, "poll.timeout_secs");
                assert_eq!(value, "60");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
