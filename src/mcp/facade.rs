//! Uniform tool invocation over either transport
//!
//! [`ToolInvoker`] is the single entry point callers use to run a tool:
//!
//! - [`GatewayToolClient`] resolves the server name to a gateway server
//!   type, ensures a session for it, and calls the tool through that
//!   session.
//! - [`StdioToolClient`] starts the named stdio server on first use, keeps
//!   it running, and calls the tool over its pipes.
//! - [`ToolRouter`] maps server names (optionally narrowed to a single tool)
//!   to one of the above, so callers look a backend up once instead of
//!   branching per call.
//!
//! Clients are explicitly owned: construct them, pass them to whatever needs
//! them, and call `shutdown` when done.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::GatewayConfig;
use crate::error::{BridgeError, Result};
use crate::mcp::session::{CredentialProvider, EnvCredentials, SessionManager};
use crate::mcp::transport::gateway::GatewayTransport;
use crate::mcp::transport::stdio::{ServerConfig, StdioTransport};
use crate::mcp::types::{ListServersResponse, McpTool};

/// Something that can run a named tool on a named server.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run `tool` on `server` with `arguments` and return its text result.
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Gateway backend
// ---------------------------------------------------------------------------

/// Tool client backed by a shared gateway connection.
pub struct GatewayToolClient {
    sessions: SessionManager,
    credentials: Arc<dyn CredentialProvider>,
    aliases: HashMap<String, String>,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for GatewayToolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayToolClient")
            .field("transport", self.sessions.transport())
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

impl GatewayToolClient {
    /// Wrap an open gateway connection.
    pub fn new(transport: Arc<GatewayTransport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            sessions: SessionManager::new(transport),
            credentials,
            aliases: HashMap::new(),
            call_timeout: None,
        }
    }

    /// Connect using `config`, with aliases and env-sourced credentials from it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connection`] if the gateway is unreachable.
    pub async fn connect(config: &GatewayConfig) -> Result<Self> {
        let transport = GatewayTransport::connect(
            &config.host,
            config.port,
            config.connect_timeout(),
            config.request_timeout(),
        )
        .await?;
        let credentials = EnvCredentials::new(config.credentials.clone());
        Ok(Self::new(Arc::new(transport), Arc::new(credentials))
            .with_aliases(config.server_aliases.clone()))
    }

    /// Set the server name to server type alias map.
    pub fn with_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Override the connection's default bound for tool calls.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Map a user-facing server name to a gateway server type.
    ///
    /// Exact alias matches win, then case-insensitive ones; unknown names
    /// are used as the server type unchanged.
    pub fn resolve_server_type(&self, server: &str) -> String {
        self.aliases
            .get(server)
            .or_else(|| self.aliases.get(&server.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| server.to_string())
    }

    /// Session cache for this client.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Servers managed by the gateway.
    pub async fn list_servers(&self) -> Result<ListServersResponse> {
        self.sessions.transport().list_servers().await
    }

    /// Sessions the gateway holds for this connection.
    pub async fn list_sessions(&self) -> Result<Vec<serde_json::Value>> {
        self.sessions.transport().list_sessions().await
    }

    /// Destroy every cached session, then disconnect.
    pub async fn shutdown(&self) {
        let destroyed = self.sessions.destroy_all().await;
        tracing::debug!(destroyed, "gateway sessions destroyed");
        self.sessions.transport().disconnect().await;
    }
}

#[async_trait]
impl ToolInvoker for GatewayToolClient {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<String> {
        let server_type = self.resolve_server_type(server);
        let session = self
            .sessions
            .ensure_session(&server_type, self.credentials.as_ref())
            .await?;

        let result = self
            .sessions
            .transport()
            .call_tool(&session.session_id, tool, arguments, self.call_timeout)
            .await?;
        format_gateway_result(&result)
    }
}

/// Render a gateway tool result as text: strings verbatim, structures as
/// pretty-printed JSON.
pub fn format_gateway_result(result: &serde_json::Value) -> Result<String> {
    match result {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            serde_json::to_string_pretty(result).map_err(|e| BridgeError::Serialization(e).into())
        }
        other => Ok(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Stdio backend
// ---------------------------------------------------------------------------

/// Tool client that runs each configured server as a child process.
///
/// Servers start lazily on first use and stay up until
/// [`StdioToolClient::shutdown`].
#[derive(Debug)]
pub struct StdioToolClient {
    configs: HashMap<String, ServerConfig>,
    running: Mutex<HashMap<String, Arc<StdioTransport>>>,
}

impl StdioToolClient {
    /// Create a client for the given servers; nothing is spawned yet.
    pub fn new(configs: impl IntoIterator<Item = ServerConfig>) -> Self {
        Self {
            configs: configs
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Names of the configured servers, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    /// The running transport for `server`, starting it if necessary.
    ///
    /// The registry lock is released before the server starts, so a slow
    /// start never delays calls to other servers. Concurrent starts of the
    /// same server are serialized by the transport itself. A server whose
    /// start fails is stopped and forgotten, so a later call retries from
    /// scratch.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for an unknown server name, or the
    /// start failure.
    pub async fn transport(&self, server: &str) -> Result<Arc<StdioTransport>> {
        let transport = {
            let mut running = self.running.lock().await;
            match running.get(server) {
                Some(transport) => Arc::clone(transport),
                None => {
                    let config = self.configs.get(server).ok_or_else(|| {
                        BridgeError::Config(format!("unknown stdio server '{server}'"))
                    })?;
                    let transport = Arc::new(StdioTransport::new(config.clone()));
                    running.insert(server.to_string(), Arc::clone(&transport));
                    transport
                }
            }
        };

        if let Err(e) = transport.start().await {
            transport.stop().await;
            let mut running = self.running.lock().await;
            if running
                .get(server)
                .is_some_and(|current| Arc::ptr_eq(current, &transport))
            {
                running.remove(server);
            }
            return Err(e);
        }
        Ok(transport)
    }

    /// Tool catalogue of `server`.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<McpTool>> {
        self.transport(server).await?.list_tools().await
    }

    /// Stop every started server.
    pub async fn shutdown(&self) {
        let running: Vec<Arc<StdioTransport>> = {
            let mut running = self.running.lock().await;
            running.drain().map(|(_, transport)| transport).collect()
        };
        for transport in running {
            transport.stop().await;
        }
    }
}

#[async_trait]
impl ToolInvoker for StdioToolClient {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<String> {
        self.transport(server)
            .await?
            .call_tool(tool, arguments)
            .await
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Registry from server name (and optionally tool name) to a backend.
///
/// A route registered for a specific tool takes precedence over the route
/// for its whole server.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mcp_bridge::mcp::facade::{StdioToolClient, ToolInvoker, ToolRouter};
///
/// # async fn example(stdio: Arc<StdioToolClient>) -> anyhow::Result<()> {
/// let router = ToolRouter::new().route("demo", stdio);
/// let text = router.call_tool("demo", "echo", serde_json::json!({"text": "hi"})).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Clone)]
pub struct ToolRouter {
    routes: HashMap<(String, Option<String>), Arc<dyn ToolInvoker>>,
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every tool of `server` to `invoker`.
    pub fn route(mut self, server: impl Into<String>, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.routes.insert((server.into(), None), invoker);
        self
    }

    /// Route one tool of `server` to `invoker`.
    pub fn route_tool(
        mut self,
        server: impl Into<String>,
        tool: impl Into<String>,
        invoker: Arc<dyn ToolInvoker>,
    ) -> Self {
        self.routes
            .insert((server.into(), Some(tool.into())), invoker);
        self
    }

    /// Backend responsible for `tool` on `server`, if any.
    pub fn resolve(&self, server: &str, tool: &str) -> Option<&Arc<dyn ToolInvoker>> {
        self.routes
            .get(&(server.to_string(), Some(tool.to_string())))
            .or_else(|| self.routes.get(&(server.to_string(), None)))
    }
}

#[async_trait]
impl ToolInvoker for ToolRouter {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<String> {
        let invoker = self.resolve(server, tool).ok_or_else(|| {
            BridgeError::Config(format!("no route for tool '{tool}' on server '{server}'"))
        })?;
        invoker.call_tool(server, tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::session::StaticCredentials;
    use crate::mcp::transport::fake::FakeGateway;
    use serde_json::json;

    /// Invoker that answers with a fixed label.
    struct Labelled(&'static str);

    #[async_trait]
    impl ToolInvoker for Labelled {
        async fn call_tool(
            &self,
            server: &str,
            tool: &str,
            _arguments: serde_json::Value,
        ) -> Result<String> {
            Ok(format!("{}:{server}/{tool}", self.0))
        }
    }

    fn gateway_client() -> (GatewayToolClient, crate::mcp::transport::fake::RequestLog) {
        let (transport, log) = FakeGateway::serve(Duration::from_secs(5), |req| {
            let params = req.params.clone().unwrap_or_default();
            match req.method.as_deref() {
                Some("mcp-manager/create-session") => Some(Ok(json!({
                    "sessionId": "sess-1",
                    "serverType": params["serverType"],
                    "created": "now"
                }))),
                Some("mcp-manager/destroy-session") => Some(Ok(json!({"destroyed": true}))),
                Some("tools/call") => Some(Ok(json!({
                    "session": params["sessionId"],
                    "tool": params["name"]
                }))),
                _ => None,
            }
        });
        let client = GatewayToolClient::new(Arc::new(transport), Arc::new(StaticCredentials::new()))
            .with_aliases(HashMap::from([(
                "devops".to_string(),
                "Azure DevOps".to_string(),
            )]));
        (client, log)
    }

    #[test]
    fn test_format_gateway_result() {
        assert_eq!(format_gateway_result(&json!("text")).unwrap(), "text");
        assert_eq!(format_gateway_result(&json!(7)).unwrap(), "7");
        assert_eq!(
            format_gateway_result(&json!({"a": 1})).unwrap(),
            "{\n  \"a\": 1\n}"
        );
    }

    #[tokio::test]
    async fn test_resolve_server_type_uses_aliases() {
        let (client, _log) = gateway_client();
        assert_eq!(client.resolve_server_type("devops"), "Azure DevOps");
        assert_eq!(client.resolve_server_type("DevOps"), "Azure DevOps");
        assert_eq!(client.resolve_server_type("Confluence"), "Confluence");
    }

    #[tokio::test]
    async fn test_gateway_call_tool_creates_session_once() {
        let (client, log) = gateway_client();

        let first = client
            .call_tool("devops", "list_projects", json!({}))
            .await
            .unwrap();
        client
            .call_tool("devops", "list_projects", json!({}))
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed, json!({"session": "sess-1", "tool": "list_projects"}));

        let log = log.lock().unwrap();
        let creates: Vec<_> = log
            .iter()
            .filter(|m| m.method.as_deref() == Some("mcp-manager/create-session"))
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].params.as_ref().unwrap()["serverType"], "Azure DevOps");
    }

    #[tokio::test]
    async fn test_gateway_shutdown_destroys_sessions_and_disconnects() {
        let (client, log) = gateway_client();
        client.call_tool("devops", "x", json!({})).await.unwrap();

        client.shutdown().await;

        assert!(!client.sessions().transport().is_connected());
        assert!(client.sessions().cached_sessions().await.is_empty());
        assert!(log
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.method.as_deref() == Some("mcp-manager/destroy-session")));
    }

    #[tokio::test]
    async fn test_router_prefers_tool_specific_route() {
        let router = ToolRouter::new()
            .route("jira", Arc::new(Labelled("server")))
            .route_tool("jira", "search", Arc::new(Labelled("tool")));

        assert_eq!(
            router.call_tool("jira", "search", json!({})).await.unwrap(),
            "tool:jira/search"
        );
        assert_eq!(
            router.call_tool("jira", "get", json!({})).await.unwrap(),
            "server:jira/get"
        );
    }

    #[tokio::test]
    async fn test_router_unknown_server_is_config_error() {
        let router = ToolRouter::new();
        let err = router
            .call_tool("nowhere", "x", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_stdio_unknown_server_is_config_error() {
        let client = StdioToolClient::new(Vec::new());
        let err = client.call_tool("ghost", "x", json!({})).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::Config(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_failed_start_is_not_cached() {
        let client = StdioToolClient::new([ServerConfig::new(
            "broken",
            vec!["sh".into(), "-c".into(), "exit 1".into()],
        )
        .with_stop_grace(Duration::from_secs(1))]);

        assert!(client.call_tool("broken", "x", json!({})).await.is_err());
        assert!(client.running.lock().await.is_empty());
        client.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_slow_call_does_not_block_other_servers() {
        let sh = |name: &str, script: &str| {
            ServerConfig::new(name, vec!["sh".into(), "-c".into(), script.into()])
                .with_read_timeout(Duration::from_secs(30))
                .with_stop_grace(Duration::from_secs(1))
        };
        let init = r#"read line; echo '{"jsonrpc":"2.0","id":"1","result":{"protocolVersion":"2024-11-05"}}'; read line"#;
        let fast = format!(
            r#"{init}; while read line; do echo '{{"jsonrpc":"2.0","id":"2","result":{{"content":[{{"type":"text","text":"ok"}}]}}}}'; done"#
        );
        // "slow" never finishes its handshake.
        let client = Arc::new(StdioToolClient::new([
            sh("fast", &fast),
            sh("slow", "read line; sleep 30"),
        ]));

        let stuck = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call_tool("slow", "t", json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let reply = tokio::time::timeout(
            Duration::from_secs(1),
            client.call_tool("fast", "t", json!({})),
        )
        .await
        .expect("call to fast server waited on slow start");
        assert_eq!(reply.unwrap(), "ok");

        stuck.abort();
        client.shutdown().await;
    }
}
