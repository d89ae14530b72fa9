//! Multiplexed TCP transport to the MCP gateway
//!
//! [`GatewayTransport`] owns one connection to the gateway process. Two
//! background tasks service it:
//!
//! - a reader that decodes inbound lines with [`JsonRpcCodec`] and hands
//!   every frame to the shared [`JsonRpcClient`], and
//! - a writer that drains the client's outbound channel onto the socket.
//!
//! Any number of callers may issue requests concurrently; each is matched
//! to its response by id alone, so responses may arrive in any order.
//!
//! # Lifecycle
//!
//! [`GatewayTransport::connect`] opens the socket and starts both tasks.
//! [`GatewayTransport::disconnect`] cancels them, closes the socket, and
//! fails every outstanding request with
//! [`BridgeError::ConnectionLost`](crate::error::BridgeError::ConnectionLost).
//! The reader also closes the client on its own when the gateway hangs up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::mcp::client::{start_read_loop, JsonRpcClient};
use crate::mcp::codec::JsonRpcCodec;
use crate::mcp::types::{
    CreateSessionParams, CreateSessionResponse, DestroySessionParams, DestroySessionResponse,
    JsonRpcMessage, ListServersResponse, ListSessionsResponse, SessionToolCallParams,
    METHOD_CREATE_SESSION, METHOD_DESTROY_SESSION, METHOD_LIST_SERVERS, METHOD_LIST_SESSIONS,
    METHOD_TOOLS_CALL,
};

/// One multiplexed JSON-RPC connection to the gateway.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use mcp_bridge::mcp::transport::gateway::GatewayTransport;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let gateway = GatewayTransport::connect(
///     "localhost",
///     8700,
///     Duration::from_secs(10),
///     Duration::from_secs(60),
/// )
/// .await?;
/// let servers = gateway.list_servers().await?;
/// println!("{} servers", servers.count);
/// gateway.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct GatewayTransport {
    peer: String,
    client: Arc<JsonRpcClient>,
    cancellation: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl std::fmt::Debug for GatewayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayTransport")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GatewayTransport {
    /// Open a TCP connection to the gateway and start the I/O tasks.
    ///
    /// # Arguments
    ///
    /// * `host` - Gateway host name or address.
    /// * `port` - Gateway port.
    /// * `connect_timeout` - Bound on establishing the connection.
    /// * `request_timeout` - Default bound applied to every request.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connection`] if the connection cannot be
    /// established within `connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(BridgeError::Connection(format!(
                    "failed to connect to gateway at {peer}: {e}"
                ))
                .into())
            }
            Err(_) => {
                return Err(BridgeError::Connection(format!(
                    "timed out after {connect_timeout:?} connecting to gateway at {peer}"
                ))
                .into())
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("could not set TCP_NODELAY: {e}");
        }

        tracing::info!(%peer, "connected to gateway");
        Ok(Self::from_stream(stream, peer, request_timeout))
    }

    /// Drive an already-open byte stream as a gateway connection.
    ///
    /// Used by [`GatewayTransport::connect`] and by tests that substitute an
    /// in-memory stream for the socket.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>, request_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let client = Arc::new(JsonRpcClient::new(outbound_tx));
        let cancellation = CancellationToken::new();

        let reader = start_read_loop(
            FramedRead::new(read_half, JsonRpcCodec::new()),
            cancellation.clone(),
            Arc::clone(&client),
        );
        let writer = spawn_writer(
            FramedWrite::new(write_half, JsonRpcCodec::new()),
            outbound_rx,
            cancellation.clone(),
        );

        Self {
            peer: peer.into(),
            client,
            cancellation,
            tasks: Mutex::new(vec![reader, writer]),
            request_timeout,
        }
    }

    /// Stop both I/O tasks, close the socket and fail outstanding requests.
    ///
    /// Idempotent; calling it on a closed transport is a no-op.
    pub async fn disconnect(&self) {
        self.cancellation.cancel();
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("gateway I/O task ended abnormally: {e}");
            }
        }
        self.client.close();
        tracing::info!(peer = %self.peer, "disconnected from gateway");
    }

    /// `true` until the connection is closed by either side.
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    /// `host:port` (or test label) of the counterparty.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The request correlator shared by every caller of this connection.
    pub fn client(&self) -> &Arc<JsonRpcClient> {
        &self.client
    }

    /// Open a session against `server_type` with injected credentials.
    ///
    /// # Errors
    ///
    /// Propagates correlator failures; a gateway rejection surfaces as
    /// [`BridgeError::Remote`].
    pub async fn create_session(
        &self,
        server_type: &str,
        credentials: HashMap<String, String>,
    ) -> Result<CreateSessionResponse> {
        let params = CreateSessionParams {
            server_type: server_type.to_string(),
            credentials,
        };
        self.client
            .request(METHOD_CREATE_SESSION, params, Some(self.request_timeout))
            .await
    }

    /// Destroy a session; returns whether the gateway actually removed one.
    ///
    /// `false` means the session was already gone, which is not an error.
    pub async fn destroy_session(&self, session_id: &str) -> Result<bool> {
        let params = DestroySessionParams {
            session_id: session_id.to_string(),
        };
        let resp: DestroySessionResponse = self
            .client
            .request(METHOD_DESTROY_SESSION, params, Some(self.request_timeout))
            .await?;
        Ok(resp.destroyed)
    }

    /// Sessions the gateway holds for this connection.
    pub async fn list_sessions(&self) -> Result<Vec<serde_json::Value>> {
        let resp: ListSessionsResponse = self
            .client
            .request(
                METHOD_LIST_SESSIONS,
                serde_json::json!({}),
                Some(self.request_timeout),
            )
            .await?;
        Ok(resp.sessions)
    }

    /// Servers managed by the gateway and their status.
    pub async fn list_servers(&self) -> Result<ListServersResponse> {
        self.client
            .request(
                METHOD_LIST_SERVERS,
                serde_json::json!({}),
                Some(self.request_timeout),
            )
            .await
    }

    /// Invoke `name` through `session_id` and return the raw result.
    ///
    /// `timeout` overrides the connection's default request bound.
    pub async fn call_tool(
        &self,
        session_id: &str,
        name: &str,
        arguments: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let params = SessionToolCallParams {
            session_id: session_id.to_string(),
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(params).map_err(BridgeError::Serialization)?;
        self.client
            .send_request(
                METHOD_TOOLS_CALL,
                params,
                Some(timeout.unwrap_or(self.request_timeout)),
            )
            .await
    }
}

impl Drop for GatewayTransport {
    fn drop(&mut self) {
        // The tasks own the socket halves; cancelling them releases it.
        self.cancellation.cancel();
    }
}

/// Bound on flushing the socket after the writer loop ends.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

fn spawn_writer<W>(
    mut sink: FramedWrite<W, JsonRpcCodec>,
    mut outbound_rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
    cancellation: CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                next = outbound_rx.recv() => {
                    let Some(message) = next else { break };
                    // A peer that stops reading must not wedge disconnect.
                    let sent = tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => break,
                        sent = sink.send(message) => sent,
                    };
                    if let Err(e) = sent {
                        tracing::warn!("gateway write failed: {e}");
                        // Stop the reader too so waiting callers are failed.
                        cancellation.cancel();
                        break;
                    }
                }
            }
        }
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("error closing gateway socket: {e}"),
            Err(_) => tracing::debug!("gateway socket close timed out"),
        }
    })
}
