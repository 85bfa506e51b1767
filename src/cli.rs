//! Command-line interface definition for Relaybox
//!
//! This module defines the CLI structure using clap's derive API. Every
//! command authenticates first, performs one action and renders the
//! resulting view model.

use clap::{Parser, Subcommand};

/// Relaybox - message relay client
///
/// Exchange messages with the operator channel of a relay backend and
/// track which of them have been answered.
#[derive(Parser, Debug, Clone)]
#[command(name = "relaybox")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/relaybox.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Signed init data supplied by the host platform
    #[arg(long, env = "RELAYBOX_INIT_DATA", hide_env_values = true)]
    pub init_data: Option<String>,

    /// Override the backend base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Relaybox
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Authenticate and show the session with the default tab
    Status,

    /// Show answered messages
    Inbox,

    /// Show sent messages still waiting for an answer
    Sent,

    /// Send a message to the operators
    Send {
        /// Message text
        text: String,
    },

    /// Answer a pending message (admin only)
    Reply {
        /// Identifier of the message being answered
        #[arg(short, long)]
        message_id: i64,

        /// Answer text
        #[arg(short, long)]
        answer: String,
    },

    /// Show relay statistics (admin only)
    Stats,
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
            config: Some("config/relaybox.yaml".to_string()),
            verbose: false,
            init_data: None,
            base_url: None,
            command: Commands::Status,
        }
    }
}
