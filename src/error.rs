//! Error types for mcp-bridge
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling. Fallible functions return
//! [`Result`], an `anyhow` alias; callers that need to branch on the failure
//! kind recover it with `err.downcast_ref::<BridgeError>()`.

use std::time::Duration;

use thiserror::Error;

/// Main error type for mcp-bridge operations
///
/// Covers configuration, gateway connectivity, request correlation, remote
/// JSON-RPC errors, and stdio subprocess lifecycle failures.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be established or is not open
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection closed while the request was still outstanding
    #[error("Connection lost: request {id} ({method}) was outstanding")]
    ConnectionLost {
        /// Correlation id of the abandoned request
        id: u64,
        /// Method of the abandoned request
        method: String,
    },

    /// No response arrived within the request timeout
    #[error("Request {id} ({method}) timed out after {timeout:?}")]
    Timeout {
        /// Correlation id of the timed-out request
        id: u64,
        /// Method of the timed-out request
        method: String,
        /// The bound that elapsed
        timeout: Duration,
    },

    /// The counterparty answered with a JSON-RPC error object
    #[error("Remote error in {method} ({code}): {message}")]
    Remote {
        /// Method that failed
        method: String,
        /// JSON-RPC error code
        code: i64,
        /// Error message from the counterparty
        message: String,
    },

    /// A stdio server closed one of its pipes (stdout at EOF or stdin broken)
    #[error("MCP server '{server}' terminated (pipe closed)")]
    ProcessTerminated {
        /// Configured server name
        server: String,
    },

    /// A stdio server was used before a successful handshake
    #[error("MCP server '{server}' not started")]
    NotStarted {
        /// Configured server name
        server: String,
    },

    /// Malformed frame or invalid protocol state
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BridgeError {
    /// Returns `true` for both connection failure kinds.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            BridgeError::Connection(_) | BridgeError::ConnectionLost { .. }
        )
    }
}

/// Result type alias for mcp-bridge operations
///
/// Uses `anyhow::Error` so call sites can attach context while the typed
/// [`BridgeError`] stays recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
