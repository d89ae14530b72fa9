//! Transport-agnostic JSON-RPC 2.0 request correlator
//!
//! This module provides [`JsonRpcClient`], a channel-backed JSON-RPC 2.0
//! client that is decoupled from the underlying transport. The owner wires
//! the outbound channel to a transport writer and feeds inbound frames back
//! through [`JsonRpcClient::on_frame`] (directly, or via [`start_read_loop`]).
//!
//! # Design
//!
//! - Request ids come from a monotonically increasing counter and are never
//!   reused for the lifetime of the client.
//! - In-flight requests are tracked in a pending table keyed by id. Each
//!   entry owns a single-assignment [`oneshot`] slot; the slot is written at
//!   most once, by whichever of response delivery or connection teardown
//!   reaches it first.
//! - The table sits behind one short critical section. No I/O happens while
//!   it is held, so concurrent callers only serialize on bookkeeping.
//! - A caller's entry is removed when its call returns, whatever the
//!   outcome (including the caller's future being dropped). A response that
//!   arrives after its caller timed out is logged and dropped.
//! - [`JsonRpcClient::close`] drops every pending slot, so waiting callers
//!   fail with [`BridgeError::ConnectionLost`] instead of blocking forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::mcp::types::{JsonRpcError, JsonRpcMessage};

/// Default timeout applied to every request when the caller does not specify one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type ResponseSlot = oneshot::Sender<std::result::Result<serde_json::Value, JsonRpcError>>;

/// An outstanding request, owned by the pending table until it resolves.
struct PendingRequest {
    method: String,
    created_at: Instant,
    timeout: Duration,
    slot: ResponseSlot,
}

#[derive(Default)]
struct PendingTable {
    entries: HashMap<u64, PendingRequest>,
    closed: bool,
}

/// Transport-agnostic JSON-RPC 2.0 client.
///
/// Create one with [`JsonRpcClient::new`], passing the outbound channel
/// sender, and share it behind an `Arc` between callers and the reader.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use mcp_bridge::mcp::client::JsonRpcClient;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (out_tx, _out_rx) = mpsc::unbounded_channel();
///     let client = Arc::new(JsonRpcClient::new(out_tx));
///     // A transport writer drains `_out_rx`; a reader calls `client.on_frame`.
///     Ok(())
/// }
/// ```
pub struct JsonRpcClient {
    /// Monotonically increasing request ID counter.
    next_id: AtomicU64,
    /// In-flight requests waiting for a response.
    pending: Mutex<PendingTable>,
    /// Channel used to hand frames to the transport writer.
    outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// Removes a request's pending entry when its caller finishes or is dropped.
struct PendingGuard<'a> {
    client: &'a JsonRpcClient,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.client.lock_pending().entries.remove(&self.id);
    }
}

impl JsonRpcClient {
    /// Create a new `JsonRpcClient` that sends frames on `outbound_tx`.
    pub fn new(outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(PendingTable::default()),
            outbound_tx,
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a JSON-RPC request and wait for its result.
    ///
    /// Assigns the next id, registers the pending slot before transmitting
    /// (so a fast response can never outrun its registration), sends the
    /// request, and waits for the matching response or the timeout.
    ///
    /// # Arguments
    ///
    /// * `method` - The JSON-RPC method name.
    /// * `params` - The `params` value.
    /// * `timeout` - Optional bound; defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if no response arrives in time.
    /// Returns [`BridgeError::Remote`] if the response carries an error object.
    /// Returns [`BridgeError::ConnectionLost`] if the client is closed before
    /// or while the request is outstanding.
    pub async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let deadline = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let connection_lost = || BridgeError::ConnectionLost {
            id,
            method: method.to_string(),
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.lock_pending();
            if table.closed {
                return Err(connection_lost().into());
            }
            table.entries.insert(
                id,
                PendingRequest {
                    method: method.to_string(),
                    created_at: Instant::now(),
                    timeout: deadline,
                    slot: tx,
                },
            );
        }
        let _guard = PendingGuard { client: self, id };

        self.outbound_tx
            .send(JsonRpcMessage::request(id, method, params))
            .map_err(|_| connection_lost())?;
        tracing::debug!(id, method, "sent request");

        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(id, method, ?deadline, "request timed out");
                return Err(BridgeError::Timeout {
                    id,
                    method: method.to_string(),
                    timeout: deadline,
                }
                .into());
            }
        };

        // The slot was dropped without a value: the connection went away.
        let rpc_result = outcome.map_err(|_| connection_lost())?;

        rpc_result.map_err(|e| {
            BridgeError::Remote {
                method: method.to_string(),
                code: e.code,
                message: e.message,
            }
            .into()
        })
    }

    /// Send a request and deserialize its result into `R`.
    ///
    /// # Errors
    ///
    /// Everything [`JsonRpcClient::send_request`] returns, plus
    /// [`BridgeError::Serialization`] when params or result do not map.
    pub async fn request<P, R>(&self, method: &str, params: P, timeout: Option<Duration>) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(BridgeError::Serialization)?;
        let value = self.send_request(method, params, timeout).await?;
        serde_json::from_value(value).map_err(|e| BridgeError::Serialization(e).into())
    }

    /// Send a JSON-RPC notification (no id, no response expected).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connection`] if the outbound channel is closed.
    pub fn notify(&self, method: &str, params: serde_json::Value) -> Result<()> {
        self.outbound_tx
            .send(JsonRpcMessage::notification(method, params))
            .map_err(|_| BridgeError::Connection("outbound channel closed".to_string()))?;
        Ok(())
    }

    /// Deliver one inbound frame.
    ///
    /// A response whose id matches a pending entry resolves that entry and
    /// wakes its caller. Anything else (notifications, server requests,
    /// responses for unknown or timed-out ids) is logged and dropped.
    ///
    /// Returns `true` when the frame resolved a pending request.
    pub fn on_frame(&self, message: JsonRpcMessage) -> bool {
        if !message.is_response() {
            tracing::debug!(
                method = message.method.as_deref().unwrap_or("<none>"),
                "unsolicited message; ignoring"
            );
            return false;
        }

        let Some(id) = message.numeric_id() else {
            tracing::warn!("response has non-integer id: {:?}", message.id);
            return false;
        };

        let entry = self.lock_pending().entries.remove(&id);
        let Some(entry) = entry else {
            tracing::debug!(id, "response for unknown or expired request; dropping");
            return false;
        };

        tracing::debug!(
            id,
            method = %entry.method,
            elapsed = ?entry.created_at.elapsed(),
            timeout = ?entry.timeout,
            "response received"
        );
        // The caller may have given up between removal and send.
        entry.slot.send(message.into_outcome()).is_ok()
    }

    /// Fail every outstanding request and refuse new ones.
    ///
    /// Idempotent. Pending callers observe [`BridgeError::ConnectionLost`].
    pub fn close(&self) {
        let drained: Vec<(u64, PendingRequest)> = {
            let mut table = self.lock_pending();
            table.closed = true;
            table.entries.drain().collect()
        };
        if !drained.is_empty() {
            tracing::warn!(
                outstanding = drained.len(),
                "connection closed with requests outstanding"
            );
        }
        for (id, entry) in drained {
            tracing::debug!(id, method = %entry.method, "failing pending request");
        }
    }

    /// `true` once [`JsonRpcClient::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.lock_pending().closed
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().entries.len()
    }
}

/// Start the inbound read loop as a background Tokio task.
///
/// Each decoded frame is handed to [`JsonRpcClient::on_frame`]. The loop ends
/// when the stream ends, yields an I/O error, or `cancellation` fires; in
/// every case the client is closed so no caller is left waiting.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::codec::FramedRead;
/// use tokio_util::sync::CancellationToken;
/// use mcp_bridge::mcp::client::{start_read_loop, JsonRpcClient};
/// use mcp_bridge::mcp::codec::JsonRpcCodec;
///
/// # async fn example(stream: tokio::net::tcp::OwnedReadHalf) {
/// let (out_tx, _out_rx) = mpsc::unbounded_channel();
/// let client = Arc::new(JsonRpcClient::new(out_tx));
/// let token = CancellationToken::new();
/// let frames = FramedRead::new(stream, JsonRpcCodec::new());
/// let handle = start_read_loop(frames, token.clone(), Arc::clone(&client));
/// token.cancel();
/// handle.await.unwrap();
/// # }
/// ```
pub fn start_read_loop<S>(
    mut frames: S,
    cancellation: CancellationToken,
    client: Arc<JsonRpcClient>,
) -> tokio::task::JoinHandle<()>
where
    S: Stream<Item = std::result::Result<JsonRpcMessage, BridgeError>> + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    tracing::debug!("read loop cancelled");
                    break;
                }

                next = frames.next() => match next {
                    Some(Ok(message)) => {
                        client.on_frame(message);
                    }
                    Some(Err(e)) => {
                        tracing::warn!("read loop stopped on transport error: {e}");
                        break;
                    }
                    None => {
                        tracing::info!("connection closed by peer");
                        break;
                    }
                }
            }
        }
        client.close();
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
