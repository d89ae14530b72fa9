//! mcp-bridge - JSON-RPC tool invocation for MCP servers
//!
//! This library lets a client invoke named tools on independently managed
//! MCP servers, either through a shared gateway process over one multiplexed
//! TCP connection, or by running each server as a child process over stdio.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp`: Framing, request correlation, handshake, transports, sessions,
//!   and the tool invocation facade
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: CLI command handlers
//!
//! # Example
//!
//! ```no_run
//! use mcp_bridge::mcp::{GatewayToolClient, ToolInvoker};
//! use mcp_bridge::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let client = GatewayToolClient::connect(&config.gateway).await?;
//!     let text = client
//!         .call_tool("devops", "list_projects", serde_json::json!({}))
//!         .await;
//!     client.shutdown().await;
//!     println!("{}", text?);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;

// Re-export commonly used types
pub use config::Config;
pub use error::{BridgeError, Result};
pub use mcp::{GatewayToolClient, StdioToolClient, ToolInvoker, ToolRouter};
