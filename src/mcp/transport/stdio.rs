//! Stdio transport for MCP child-process servers
//!
//! This module implements [`StdioTransport`], which spawns one child process
//! per configured server and talks to it over its stdin/stdout pipes using
//! newline-delimited JSON framing ([`JsonRpcCodec`]).
//!
//! # Protocol
//!
//! - Requests are written to the child's stdin as one JSON object per line
//!   and flushed immediately. Request ids are strings of a per-process
//!   counter.
//! - Exactly one request is in flight per process. The transport holds its
//!   process lock from writing a request until the matching response line
//!   has been read, so concurrent callers are served strictly in turn.
//! - While waiting, notifications and responses for other ids are skipped.
//!   The wait is bounded by [`ServerConfig::read_timeout`].
//! - The child's stderr is drained in the background and logged via
//!   `tracing::debug!`. Stderr output is diagnostic only and never treated
//!   as an error condition.
//!
//! # Lifecycle
//!
//! [`StdioTransport::start`] spawns the process (inheriting the parent
//! environment plus the configured overrides) and runs the
//! [`Handshake`]. If the handshake fails, `start` returns the error and the
//! process stays registered so the caller can release it with
//! [`StdioTransport::stop`]. `stop` sends SIGTERM (Unix) or a kill request,
//! waits for [`ServerConfig::stop_grace`], then force-kills.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{BridgeError, Result};
use crate::mcp::codec::JsonRpcCodec;
use crate::mcp::protocol::Handshake;
use crate::mcp::types::{
    CallToolParams, JsonRpcMessage, ListToolsResponse, McpTool, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST,
};

/// Default bound on waiting for one response line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time a server is given to exit after SIGTERM.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Launch description of one stdio server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Name used in logs and errors.
    pub name: String,
    /// Program followed by its leading arguments.
    pub command: Vec<String>,
    /// Extra arguments appended after `command`.
    pub args: Vec<String>,
    /// Environment overrides layered over the parent environment.
    pub env: HashMap<String, String>,
    /// Bound on waiting for each response.
    pub read_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL in [`StdioTransport::stop`].
    pub stop_grace: Duration,
}

impl ServerConfig {
    /// Create a config with default timeouts and no overrides.
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            args: Vec::new(),
            env: HashMap::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Set the extra arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add one environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the per-response read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the stop grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// A running child process and its framed pipes.
struct ServerProcess {
    child: Child,
    writer: FramedWrite<ChildStdin, JsonRpcCodec>,
    reader: FramedRead<ChildStdout, JsonRpcCodec>,
    next_id: u64,
    handshake: Handshake,
    stderr_task: JoinHandle<()>,
}

impl ServerProcess {
    fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Write one frame and flush it.
    async fn send(&mut self, message: JsonRpcMessage, server: &str) -> Result<()> {
        self.writer.send(message).await.map_err(|e| match e {
            BridgeError::Io(io) if io.kind() == std::io::ErrorKind::BrokenPipe => {
                BridgeError::ProcessTerminated {
                    server: server.to_string(),
                }
                .into()
            }
            other => anyhow::Error::from(other),
        })
    }

    /// Read frames until the response for `id` arrives.
    ///
    /// Returns `Ok(None)` when stdout closes first.
    async fn read_response(
        &mut self,
        id: u64,
        method: &str,
        timeout: Duration,
    ) -> Result<Option<JsonRpcMessage>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, self.reader.next())
                .await
                .map_err(|_| BridgeError::Timeout {
                    id,
                    method: method.to_string(),
                    timeout,
                })?;

            let message = match next {
                None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(message)) => message,
            };

            if !message.is_response() {
                tracing::debug!(
                    method = message.method.as_deref().unwrap_or("<none>"),
                    "skipping server-initiated message"
                );
                continue;
            }
            if message.numeric_id() != Some(id) {
                tracing::debug!(expected = id, got = ?message.id, "skipping stale response");
                continue;
            }
            return Ok(Some(message));
        }
    }

    /// One request/response exchange.
    async fn round_trip(
        &mut self,
        server: &str,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let id = self.next_request_id();
        self.send(JsonRpcMessage::request(id.to_string(), method, params), server)
            .await?;
        tracing::debug!(server, id, method, "sent request");

        let response = self
            .read_response(id, method, timeout)
            .await?
            .ok_or_else(|| BridgeError::ProcessTerminated {
                server: server.to_string(),
            })?;

        response.into_outcome().map_err(|e| {
            BridgeError::Remote {
                method: method.to_string(),
                code: e.code,
                message: e.message,
            }
            .into()
        })
    }

    async fn handshake(&mut self, server: &str, timeout: Duration) -> Result<()> {
        let id = self.next_request_id();
        let initialize = self.handshake.begin(id.to_string())?;
        self.send(initialize, server).await?;

        let response = self
            .read_response(id, crate::mcp::types::METHOD_INITIALIZE, timeout)
            .await?;
        let initialized = self.handshake.complete(response)?;
        self.send(initialized, server).await?;
        self.handshake.confirm()
    }
}

/// Stdio-based MCP transport for one server.
///
/// # Examples
///
/// ```no_run
/// use mcp_bridge::mcp::transport::stdio::{ServerConfig, StdioTransport};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = ServerConfig::new("demo", vec!["python3".into(), "server.py".into()]);
/// let transport = StdioTransport::new(config);
/// if let Err(e) = transport.start().await {
///     transport.stop().await;
///     return Err(e);
/// }
/// let text = transport.call_tool("echo", serde_json::json!({"text": "hi"})).await?;
/// println!("{text}");
/// transport.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct StdioTransport {
    config: ServerConfig,
    process: Mutex<Option<ServerProcess>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Create a transport; nothing is spawned until [`StdioTransport::start`].
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
        }
    }

    /// Configured server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Launch description.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// `true` while a process is running and its handshake succeeded.
    pub async fn is_ready(&self) -> bool {
        self.process
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| p.handshake.is_ready())
    }

    /// Spawn the server and perform the initialize handshake.
    ///
    /// Calling `start` on an already-ready transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or the handshake
    /// fails. After a handshake failure the process is still held; call
    /// [`StdioTransport::stop`] to release it.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.process.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.handshake.is_ready() {
                return Ok(());
            }
            return Err(BridgeError::Protocol(format!(
                "MCP server '{}' failed to start; stop it before retrying",
                self.config.name
            ))
            .into());
        }

        let process = slot.insert(self.spawn()?);
        if let Err(e) = process
            .handshake(&self.config.name, self.config.read_timeout)
            .await
        {
            process.handshake.fail();
            tracing::warn!(server = %self.config.name, "handshake failed: {e:#}");
            return Err(e);
        }
        Ok(())
    }

    fn spawn(&self) -> Result<ServerProcess> {
        let name = &self.config.name;
        let (program, leading_args) = self.config.command.split_first().ok_or_else(|| {
            BridgeError::Config(format!("MCP server '{name}' has an empty command"))
        })?;

        let mut cmd = Command::new(program);
        cmd.args(leading_args)
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(BridgeError::Io)
            .with_context(|| format!("failed to spawn MCP server '{name}' (`{program}`)"))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            BridgeError::Protocol(format!("stdin of MCP server '{name}' unavailable after spawn"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            BridgeError::Protocol(format!("stdout of MCP server '{name}' unavailable after spawn"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            BridgeError::Protocol(format!("stderr of MCP server '{name}' unavailable after spawn"))
        })?;

        let server = name.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(
                    target: "mcp_bridge::mcp::transport::stdio",
                    server = %server,
                    "mcp server stderr: {}",
                    line
                );
            }
        });

        tracing::info!(server = %name, pid = ?child.id(), "spawned MCP server");

        Ok(ServerProcess {
            child,
            writer: FramedWrite::new(stdin, JsonRpcCodec::new()),
            reader: FramedRead::new(stdout, JsonRpcCodec::new()),
            next_id: 1,
            handshake: Handshake::new(name.clone()),
            stderr_task,
        })
    }

    fn ready_process<'a>(
        &self,
        slot: &'a mut Option<ServerProcess>,
    ) -> Result<&'a mut ServerProcess> {
        match slot.as_mut() {
            Some(process) if process.handshake.is_ready() => Ok(process),
            _ => Err(BridgeError::NotStarted {
                server: self.config.name.clone(),
            }
            .into()),
        }
    }

    /// Invoke a tool and return its normalized text result.
    ///
    /// See [`normalize_tool_result`] for how the result is flattened.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotStarted`] before a successful handshake.
    /// - [`BridgeError::ProcessTerminated`] if the process closes its pipes first.
    /// - [`BridgeError::Remote`] for an error response.
    /// - [`BridgeError::Timeout`] if no response arrives within the read timeout.
    pub async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String> {
        let result = self.call_tool_raw(name, arguments).await?;
        if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            tracing::warn!(server = %self.config.name, tool = name, "tool reported an error result");
        }
        Ok(normalize_tool_result(&result))
    }

    /// Invoke a tool and return the unmodified `result` value.
    pub async fn call_tool_raw(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(BridgeError::Serialization)?;

        let mut slot = self.process.lock().await;
        let process = self.ready_process(&mut slot)?;
        process
            .round_trip(
                &self.config.name,
                METHOD_TOOLS_CALL,
                params,
                self.config.read_timeout,
            )
            .await
    }

    /// Fetch the server's tool catalogue.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let mut slot = self.process.lock().await;
        let process = self.ready_process(&mut slot)?;
        let result = process
            .round_trip(
                &self.config.name,
                METHOD_TOOLS_LIST,
                serde_json::json!({}),
                self.config.read_timeout,
            )
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        let resp: ListToolsResponse =
            serde_json::from_value(result).map_err(BridgeError::Serialization)?;
        Ok(resp.tools)
    }

    /// Terminate the server and release its process handle.
    ///
    /// Sends SIGTERM (Unix) or a kill request, waits up to
    /// [`ServerConfig::stop_grace`], then force-kills. The handle is released
    /// in every case; stopping a transport that is not running is a no-op.
    pub async fn stop(&self) {
        let Some(process) = self.process.lock().await.take() else {
            return;
        };
        let ServerProcess {
            mut child,
            writer,
            reader,
            stderr_task,
            ..
        } = process;
        let name = &self.config.name;

        // Closing stdin lets well-behaved servers exit on their own.
        drop(writer);
        drop(reader);
        request_termination(&mut child);

        match tokio::time::timeout(self.config.stop_grace, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(server = %name, %status, "MCP server exited"),
            Ok(Err(e)) => tracing::warn!(server = %name, "error waiting for MCP server: {e}"),
            Err(_) => {
                tracing::warn!(
                    server = %name,
                    grace = ?self.config.stop_grace,
                    "MCP server ignored SIGTERM; killing"
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(server = %name, "failed to kill MCP server: {e}");
                }
            }
        }
        stderr_task.abort();
    }
}

/// Ask the child to exit without forcing it.
fn request_termination(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid is a valid process ID obtained from tokio::process::Child
            // that has not been reaped yet.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return;
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!("start_kill failed: {e}");
    }
}

/// Flatten a `tools/call` result into text.
///
/// - An object with a `content` array yields the text of its first
///   `{"type": "text"}` item; when there is none, the serialized `content`.
/// - Any other object is serialized whole.
/// - A string is returned verbatim; other values as JSON text.
///
/// # Examples
///
/// ```
/// use mcp_bridge::mcp::transport::stdio::normalize_tool_result;
/// use serde_json::json;
///
/// let result = json!({"content": [{"type": "text", "text": "hello"}]});
/// assert_eq!(normalize_tool_result(&result), "hello");
/// ```
pub fn normalize_tool_result(result: &serde_json::Value) -> String {
    match result {
        serde_json::Value::Object(map) => match map.get("content") {
            Some(content) => content
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .find(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                })
                .and_then(|item| item.get("text"))
                .and_then(|text| text.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| content.to_string()),
            None => result.to_string(),
        },
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
