//! JSON-RPC 2.0 primitives and MCP gateway/stdio wire types
//!
//! This module defines every wire type exchanged with the gateway and with
//! stdio MCP servers. Struct fields are `camelCase` on the wire via
//! `#[serde(rename_all = "camelCase")]`. All `Option<>` fields omit their key
//! from JSON when `None`, and list-shaped responses default to empty when the
//! counterparty leaves a field out.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// JSON-RPC version tag carried by every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision sent in the stdio `initialize` request.
///
/// No negotiation happens: the server's answer is accepted as long as it is
/// not an error.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ---------------------------------------------------------------------------
// Method constants
// ---------------------------------------------------------------------------

/// Gateway: open a session against a server type with injected credentials.
pub const METHOD_CREATE_SESSION: &str = "mcp-manager/create-session";
/// Gateway: tear down a session.
pub const METHOD_DESTROY_SESSION: &str = "mcp-manager/destroy-session";
/// Gateway: list sessions owned by this connection.
pub const METHOD_LIST_SESSIONS: &str = "mcp-manager/list-sessions";
/// Gateway: list managed servers and their status.
pub const METHOD_LIST_SERVERS: &str = "mcp-manager/list-servers";
/// Invoke a named tool (gateway and stdio).
pub const METHOD_TOOLS_CALL: &str = "tools/call";
/// Request the tool catalogue of a stdio server.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
/// Lifecycle: client sends `initialize` to open a stdio session.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Lifecycle: client sends `notifications/initialized` after the server ACKs.
pub const METHOD_INITIALIZED: &str = "notifications/initialized";

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 wire types
// ---------------------------------------------------------------------------

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// A single JSON-RPC 2.0 frame: request, notification, or response.
///
/// Requests carry `id` + `method`, notifications carry `method` only, and
/// responses carry `id` plus `result` or `error`. Frames are never mutated
/// after they are handed to a transport.
///
/// # Examples
///
/// ```
/// use mcp_bridge::mcp::types::JsonRpcMessage;
///
/// let req = JsonRpcMessage::request(1, "tools/list", serde_json::json!({}));
/// assert_eq!(req.numeric_id(), Some(1));
/// assert!(!req.is_response());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    /// Protocol version identifier; always `"2.0"` on outbound frames.
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Correlation identifier. Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Method name for requests and notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Successful result value; mutually exclusive with `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error object; mutually exclusive with `result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    /// Build a request frame.
    pub fn request(
        id: impl Into<serde_json::Value>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id.into()),
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// Build a notification frame (no `id`, no response expected).
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: None,
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// Build a successful response frame.
    pub fn response(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response frame.
    pub fn error_response(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// `true` when the frame answers a request: it has an id and no method.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }

    /// `true` when the frame is a notification: a method without an id.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    /// The frame id as an integer.
    ///
    /// Accepts both numeric ids and numeric strings (`"3"`), since stdio
    /// servers echo back whichever form they were sent.
    pub fn numeric_id(&self) -> Option<u64> {
        match self.id.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Split a response into its result or error.
    ///
    /// A response with neither field resolves to `Value::Null`.
    pub fn into_outcome(self) -> std::result::Result<serde_json::Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"JSON-RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use mcp_bridge::mcp::types::JsonRpcError;
///
/// let e = JsonRpcError { code: -32600, message: "Invalid Request".to_string(), data: None };
/// assert_eq!(e.to_string(), "JSON-RPC error -32600: Invalid Request");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable error description.
    #[serde(default)]
    pub message: String,
    /// Optional additional error context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

// ---------------------------------------------------------------------------
// Gateway types
// ---------------------------------------------------------------------------

/// Parameters for `mcp-manager/create-session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionParams {
    /// Gateway server type, e.g. `"Confluence"`.
    pub server_type: String,
    /// Environment variables injected into the server instance.
    pub credentials: HashMap<String, String>,
}

/// Result of `mcp-manager/create-session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    /// Gateway-assigned session identifier.
    pub session_id: String,
    /// Server type the session is bound to.
    pub server_type: String,
    /// Creation timestamp as reported by the gateway.
    #[serde(default)]
    pub created: String,
}

/// Parameters for `mcp-manager/destroy-session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroySessionParams {
    /// Session to destroy.
    pub session_id: String,
}

/// Result of `mcp-manager/destroy-session`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestroySessionResponse {
    /// Whether the gateway actually removed a session.
    #[serde(default)]
    pub destroyed: bool,
}

/// Result of `mcp-manager/list-sessions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    /// Raw session descriptors; their shape is gateway-defined.
    #[serde(default)]
    pub sessions: Vec<serde_json::Value>,
}

/// One entry of `mcp-manager/list-servers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Server type.
    #[serde(default, rename = "type")]
    pub server_type: String,
    /// Port the managed server listens on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Free-form status string.
    #[serde(default)]
    pub status: String,
    /// Whether the server process is running.
    #[serde(default)]
    pub is_running: bool,
    /// Whether the gateway starts the server automatically.
    #[serde(default)]
    pub auto_start: bool,
}

/// Result of `mcp-manager/list-servers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListServersResponse {
    /// Managed servers.
    #[serde(default)]
    pub servers: Vec<ServerStatus>,
    /// Server count as reported by the gateway.
    #[serde(default)]
    pub count: usize,
}

/// Parameters for a gateway `tools/call`, routed by session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToolCallParams {
    /// Session the call is routed through.
    pub session_id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments object.
    pub arguments: serde_json::Value,
}

/// A logical handle to one gateway-managed server instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Gateway-assigned session identifier.
    pub session_id: String,
    /// Server type the session is bound to.
    pub server_type: String,
    /// Creation timestamp as reported by the gateway.
    pub created_at: String,
    /// Cleared once the session has been destroyed.
    pub active: bool,
}

impl From<CreateSessionResponse> for Session {
    fn from(resp: CreateSessionResponse) -> Self {
        Self {
            session_id: resp.session_id,
            server_type: resp.server_type,
            created_at: resp.created,
            active: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Stdio server types
// ---------------------------------------------------------------------------

/// Name and version of a protocol participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
}

impl Default for Implementation {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the stdio `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision requested by the client.
    pub protocol_version: String,
    /// Client capabilities; always an empty object.
    pub capabilities: serde_json::Value,
    /// Client identity.
    pub client_info: Implementation,
}

/// Parameters for a stdio `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments object.
    pub arguments: serde_json::Value,
}

/// A tool definition returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool arguments.
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResponse {
    /// Advertised tools.
    #[serde(default)]
    pub tools: Vec<McpTool>,
}
