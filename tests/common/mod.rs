use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mcp_bridge::mcp::codec::JsonRpcCodec;
use mcp_bridge::mcp::transport::stdio::ServerConfig;
use mcp_bridge::mcp::types::{JsonRpcError, JsonRpcMessage};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Returns the path to the `mcp_test_server` binary.
///
/// Cargo sets `CARGO_BIN_EXE_mcp_test_server` automatically when running
/// integration tests in the same package. Falls back to `target/debug` for
/// convenience during manual testing.
#[allow(dead_code)]
pub fn test_server_exe() -> PathBuf {
    if let Some(p) = option_env!("CARGO_BIN_EXE_mcp_test_server") {
        return PathBuf::from(p);
    }
    if let Ok(p) = std::env::var("CARGO_BIN_EXE_mcp_test_server") {
        return PathBuf::from(p);
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("target")
        .join("debug")
        .join("mcp_test_server")
}

/// Launch description for the test server under `name`.
#[allow(dead_code)]
pub fn test_server_config(name: &str) -> ServerConfig {
    ServerConfig::new(name, vec![test_server_exe().to_string_lossy().to_string()])
        .with_read_timeout(Duration::from_secs(10))
        .with_stop_grace(Duration::from_secs(2))
}

/// How the fake gateway answers one request: after `delay`, with `outcome`.
#[allow(dead_code)]
pub type Reply = (Duration, Result<serde_json::Value, JsonRpcError>);

/// Requests received by a [`spawn_fake_gateway`] instance.
#[allow(dead_code)]
pub type RequestLog = Arc<Mutex<Vec<JsonRpcMessage>>>;

/// Start a TCP gateway on an ephemeral localhost port.
///
/// Every request is passed to `handler`; `None` leaves it unanswered. Each
/// reply is sent from its own task after its delay, so replies can overtake
/// one another on the wire.
#[allow(dead_code)]
pub async fn spawn_fake_gateway<F>(handler: F) -> (u16, RequestLog)
where
    F: Fn(&JsonRpcMessage) -> Option<Reply> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind fake gateway");
    let port = listener.local_addr().unwrap().port();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let accept_log = Arc::clone(&log);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let (read_half, write_half) = socket.into_split();
            let mut frames = FramedRead::new(read_half, JsonRpcCodec::new());
            let mut sink = FramedWrite::new(write_half, JsonRpcCodec::new());
            let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();

            tokio::spawn(async move {
                while let Some(msg) = reply_rx.recv().await {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
            });

            let log = Arc::clone(&accept_log);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                while let Some(Ok(request)) = frames.next().await {
                    log.lock().unwrap().push(request.clone());
                    let Some((delay, outcome)) = handler(&request) else {
                        continue;
                    };
                    let id = request.id.clone().unwrap_or_default();
                    let reply_tx = reply_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let frame = match outcome {
                            Ok(result) => JsonRpcMessage::response(id, result),
                            Err(error) => JsonRpcMessage::error_response(id, error),
                        };
                        let _ = reply_tx.send(frame);
                    });
                }
            });
        }
    });

    (port, log)
}

/// Number of logged requests for `method`.
#[allow(dead_code)]
pub fn count_method(log: &RequestLog, method: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|m| m.method.as_deref() == Some(method))
        .count()
}
