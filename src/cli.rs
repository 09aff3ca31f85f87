//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for `tmsn-node`.

use clap::{Parser, Subcommand};

/// TMSN Node - broadcast network peer
///
/// Joins the full mesh described by the configured peer list. Every line
/// read from stdin is broadcast to all peers; every payload received from a
/// peer is printed to stdout.
#[derive(Parser, Debug)]
#[command(name = "tmsn-node")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join the network and relay stdin/stdout
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "TMSN_CONFIG")]
        config: Option<String>,

        /// Override the node identity
        #[arg(long)]
        id: Option<String>,

        /// Override the listening port
        #[arg(short, long)]
        port: Option<u16>,

        /// Add a peer as identity@address (repeatable, extends the configured list)
        #[arg(long = "peer", value_name = "ID@ADDR")]
        peers: Vec<String>,

        /// Accept inbound peers that are not in the peer list
        #[arg(long)]
        late_joiners: bool,

        /// Shut down once stdin is closed and queued payloads are sent
        #[arg(long)]
        exit_on_eof: bool,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
