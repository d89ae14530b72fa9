//! MCP initialize/initialized handshake
//!
//! [`Handshake`] is a small state machine that produces the frames of the
//! stdio lifecycle exchange and interprets the server's answer. It performs
//! no I/O itself; [`crate::mcp::transport::stdio::StdioTransport`] writes
//! the frames it returns and feeds back whatever it reads.
//!
//! ```text
//! Unstarted --begin--> Initializing --complete(ok)--> Acknowledged --confirm--> Ready
//!                           |                              |
//!                           +--complete(error | closed)----+--fail--> Failed
//! ```
//!
//! The connection is only `Ready` once the `notifications/initialized`
//! frame returned by `complete` has actually been written.
//!
//! `Ready` and `Failed` are terminal. Protocol version negotiation is not
//! performed: any non-error answer to `initialize` is accepted.

use crate::error::{BridgeError, Result};
use crate::mcp::types::{
    Implementation, InitializeParams, JsonRpcMessage, METHOD_INITIALIZE, METHOD_INITIALIZED,
    PROTOCOL_VERSION,
};

/// Lifecycle state of a stdio server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing has been sent yet.
    Unstarted,
    /// `initialize` has been sent; waiting for the server's answer.
    Initializing,
    /// The server answered `initialize`; `notifications/initialized` is
    /// not yet written.
    Acknowledged,
    /// The initialized notification was sent; tool calls are allowed.
    Ready,
    /// The server rejected `initialize` or went away before the exchange
    /// finished.
    Failed,
}

/// Handshake driver for one server process.
///
/// # Examples
///
/// ```
/// use mcp_bridge::mcp::protocol::{Handshake, HandshakeState};
/// use mcp_bridge::mcp::types::JsonRpcMessage;
/// use serde_json::json;
///
/// let mut handshake = Handshake::new("demo");
/// let init = handshake.begin("1").unwrap();
/// assert_eq!(init.method.as_deref(), Some("initialize"));
///
/// let ack = JsonRpcMessage::response(json!("1"), json!({"protocolVersion": "2024-11-05"}));
/// let initialized = handshake.complete(Some(ack)).unwrap();
/// assert!(initialized.id.is_none());
/// assert!(!handshake.is_ready());
///
/// // ... write `initialized` ...
/// handshake.confirm().unwrap();
/// assert_eq!(handshake.state(), HandshakeState::Ready);
/// ```
#[derive(Debug, Clone)]
pub struct Handshake {
    server: String,
    client_info: Implementation,
    state: HandshakeState,
}

impl Handshake {
    /// Create a handshake for the server named `server`, identifying as this crate.
    pub fn new(server: impl Into<String>) -> Self {
        Self::with_client_info(server, Implementation::default())
    }

    /// Create a handshake with a custom `clientInfo`.
    pub fn with_client_info(server: impl Into<String>, client_info: Implementation) -> Self {
        Self {
            server: server.into(),
            client_info,
            state: HandshakeState::Unstarted,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// `true` once the whole exchange has completed.
    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    /// Move to `Initializing` and return the `initialize` request to send.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Protocol`] unless the handshake is `Unstarted`.
    pub fn begin(&mut self, id: impl Into<serde_json::Value>) -> Result<JsonRpcMessage> {
        if self.state != HandshakeState::Unstarted {
            return Err(self.invalid_transition("begin").into());
        }

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: self.client_info.clone(),
        };
        let params = serde_json::to_value(params).map_err(BridgeError::Serialization)?;

        self.state = HandshakeState::Initializing;
        tracing::debug!(server = %self.server, "sending initialize");
        Ok(JsonRpcMessage::request(id, METHOD_INITIALIZE, params))
    }

    /// Interpret the answer to `initialize`.
    ///
    /// `None` means the stream closed before a response arrived. On success
    /// the handshake becomes `Acknowledged` and the returned frame is the
    /// `notifications/initialized` notification, which expects no reply.
    /// Call [`Handshake::confirm`] once it is written.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProcessTerminated`] for a closed stream and
    /// [`BridgeError::Remote`] for an error response; both leave the
    /// handshake `Failed`. Returns [`BridgeError::Protocol`] when called
    /// outside `Initializing`.
    pub fn complete(&mut self, response: Option<JsonRpcMessage>) -> Result<JsonRpcMessage> {
        if self.state != HandshakeState::Initializing {
            return Err(self.invalid_transition("complete").into());
        }

        let Some(response) = response else {
            self.state = HandshakeState::Failed;
            tracing::warn!(server = %self.server, "stream closed during initialize");
            return Err(BridgeError::ProcessTerminated {
                server: self.server.clone(),
            }
            .into());
        };

        match response.into_outcome() {
            Ok(ack) => {
                self.state = HandshakeState::Acknowledged;
                tracing::info!(
                    server = %self.server,
                    protocol_version = ack
                        .get("protocolVersion")
                        .and_then(|v| v.as_str())
                        .unwrap_or("<unspecified>"),
                    "MCP server initialized"
                );
                Ok(JsonRpcMessage::notification(
                    METHOD_INITIALIZED,
                    serde_json::json!({}),
                ))
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                tracing::warn!(server = %self.server, "initialize rejected: {e}");
                Err(BridgeError::Remote {
                    method: METHOD_INITIALIZE.to_string(),
                    code: e.code,
                    message: e.message,
                }
                .into())
            }
        }
    }

    /// Mark the initialized notification as sent and move to `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Protocol`] unless the handshake is `Acknowledged`.
    pub fn confirm(&mut self) -> Result<()> {
        if self.state != HandshakeState::Acknowledged {
            return Err(self.invalid_transition("confirm").into());
        }
        self.state = HandshakeState::Ready;
        Ok(())
    }

    /// Abandon an in-progress handshake (e.g. the read timed out or the
    /// initialized notification could not be written).
    pub fn fail(&mut self) {
        if matches!(
            self.state,
            HandshakeState::Initializing | HandshakeState::Acknowledged
        ) {
            self.state = HandshakeState::Failed;
        }
    }

    fn invalid_transition(&self, action: &str) -> BridgeError {
        BridgeError::Protocol(format!(
            "handshake for '{}' cannot {action} from state {:?}",
            self.server, self.state
        ))
    }
}
