//! Command-line interface definition for mcp-bridge
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for inspecting the gateway and invoking tools.

use clap::{Parser, Subcommand};

/// mcp-bridge - call MCP tools through a gateway or stdio servers
///
/// Connects to a shared MCP gateway (or launches configured stdio servers)
/// and invokes named tools with JSON arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Override the gateway host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Override the gateway port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcp-bridge
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List servers managed by the gateway
    Servers,

    /// List sessions held by the gateway for this connection
    Sessions,

    /// Invoke a tool
    Call {
        /// Server name (gateway server type or alias, or stdio server name)
        #[arg(short, long)]
        server: String,

        /// Tool name
        #[arg(short, long)]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Run the server as a configured stdio subprocess instead of
        /// going through the gateway
        #[arg(long)]
        stdio: bool,
    },

    /// List the tools of a configured stdio server
    Tools {
        /// Stdio server name
        #[arg(short, long)]
        server: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            host: None,
            port: None,
            command: Commands::Servers,
        }
    }
}
