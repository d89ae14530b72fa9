//! MCP transports
//!
//! Two transports carry the same line-delimited JSON-RPC frames:
//!
//! - [`gateway::GatewayTransport`] -- one persistent TCP connection to the
//!   gateway, multiplexing many concurrent requests and logical sessions
//!   through a shared [`crate::mcp::client::JsonRpcClient`].
//! - [`stdio::StdioTransport`] -- one child process per server, driven over
//!   its stdin/stdout pipes with strictly one request in flight.
//! - [`fake::FakeGateway`] -- in-process gateway peer used in tests
//!   (cfg(test) only).
//!
//! Framing for both lives in [`crate::mcp::codec`].

pub mod gateway;
pub mod stdio;

#[cfg(test)]
pub mod fake;

pub use gateway::GatewayTransport;
pub use stdio::{ServerConfig, StdioTransport};
