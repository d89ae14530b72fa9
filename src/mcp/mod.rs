//! MCP tool invocation over JSON-RPC
//!
//! This module lets a client call named tools on MCP servers, either through
//! a shared gateway process (one multiplexed TCP connection, many logical
//! sessions) or by running each server as a child process over stdio.
//!
//! # Module Layout
//!
//! - `types`     -- JSON-RPC primitives and gateway/stdio wire types
//! - `codec`     -- Line-delimited JSON framing shared by both transports
//! - `client`    -- Request correlator (ids, pending table, timeouts)
//! - `protocol`  -- initialize/initialized handshake state machine
//! - `transport` -- Gateway (TCP) and stdio (child process) transports
//! - `session`   -- Gateway session cache and credential providers
//! - `facade`    -- `ToolInvoker` entry point, backends and router

pub mod client;
pub mod codec;
pub mod facade;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

pub use facade::{GatewayToolClient, StdioToolClient, ToolInvoker, ToolRouter};
pub use session::{CredentialProvider, EnvCredentials, SessionManager, StaticCredentials};
pub use types::*;
