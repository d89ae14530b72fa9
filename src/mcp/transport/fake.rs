//! In-process fake gateway for unit tests
//!
//! [`FakeGateway::new`] returns a [`GatewayTransport`] wired to an in-memory
//! duplex pipe together with the gateway end of that pipe. From the test side:
//!
//! - read what the client sent: `gateway.next_request().await`
//! - answer it: `gateway.reply(&req, result)` or `gateway.reply_error(...)`
//! - hang up: `drop(gateway)`
//!
//! [`FakeGateway::serve`] instead answers every request automatically from a
//! handler closure and records the traffic.
//!
//! ```text
//! transport writer --> duplex --> pump --> requests   (test reads)
//! test replies ------> pump  --> duplex --> transport reader
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::mcp::codec::JsonRpcCodec;
use crate::mcp::transport::gateway::GatewayTransport;
use crate::mcp::types::{JsonRpcError, JsonRpcMessage};

/// Gateway end of an in-memory connection.
#[derive(Debug)]
pub struct FakeGateway {
    requests: mpsc::UnboundedReceiver<JsonRpcMessage>,
    replies: mpsc::UnboundedSender<JsonRpcMessage>,
}

/// Frames received by a [`FakeGateway::serve`] handler, in arrival order.
pub type RequestLog = Arc<Mutex<Vec<JsonRpcMessage>>>;

impl FakeGateway {
    /// Create a connected `(GatewayTransport, FakeGateway)` pair.
    pub fn new(request_timeout: Duration) -> (GatewayTransport, Self) {
        let (client_end, gateway_end) = tokio::io::duplex(64 * 1024);
        let transport = GatewayTransport::from_stream(client_end, "fake-gateway", request_timeout);

        let (request_tx, requests) = mpsc::unbounded_channel();
        let (replies, mut reply_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();

        tokio::spawn(async move {
            let mut framed = Framed::new(gateway_end, JsonRpcCodec::new());
            loop {
                tokio::select! {
                    inbound = framed.next() => match inbound {
                        Some(Ok(msg)) => {
                            if request_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        _ => break,
                    },
                    outbound = reply_rx.recv() => match outbound {
                        Some(msg) => {
                            if framed.send(msg).await.is_err() {
                                break;
                            }
                        }
                        // Test dropped the gateway: hang up.
                        None => break,
                    },
                }
            }
        });

        (transport, Self { requests, replies })
    }

    /// Create a transport whose requests are answered by `handler`.
    ///
    /// Returning `None` from the handler leaves the request unanswered.
    pub fn serve<F>(request_timeout: Duration, handler: F) -> (GatewayTransport, RequestLog)
    where
        F: Fn(&JsonRpcMessage) -> Option<Result<serde_json::Value, JsonRpcError>>
            + Send
            + 'static,
    {
        let (transport, mut gateway) = Self::new(request_timeout);
        let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
        let task_log = Arc::clone(&log);

        tokio::spawn(async move {
            while let Some(req) = gateway.requests.recv().await {
                task_log.lock().unwrap().push(req.clone());
                match handler(&req) {
                    Some(Ok(result)) => gateway.reply(&req, result),
                    Some(Err(error)) => {
                        let id = req.id.clone().unwrap_or_default();
                        let _ = gateway
                            .replies
                            .send(JsonRpcMessage::error_response(id, error));
                    }
                    None => {}
                }
            }
        });

        (transport, log)
    }

    /// Wait for the next frame the client sent.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within five seconds or the pipe closed.
    pub async fn next_request(&mut self) -> JsonRpcMessage {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client connection closed")
    }

    /// Answer `request` with `result`.
    pub fn reply(&self, request: &JsonRpcMessage, result: serde_json::Value) {
        let id = request.id.clone().unwrap_or_default();
        let _ = self.replies.send(JsonRpcMessage::response(id, result));
    }

    /// Answer `request` with an error object.
    pub fn reply_error(&self, request: &JsonRpcMessage, code: i64, message: &str) {
        let id = request.id.clone().unwrap_or_default();
        let _ = self.replies.send(JsonRpcMessage::error_response(
            id,
            JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            },
        ));
    }

    /// Push an arbitrary frame (e.g. a notification) to the client.
    pub fn push(&self, message: JsonRpcMessage) {
        let _ = self.replies.send(message);
    }
}
