//! MCP test server binary for integration tests
//!
//! This binary implements a minimal MCP server that communicates over
//! stdin/stdout using newline-delimited JSON (the stdio transport protocol).
//! It is used exclusively by integration tests to exercise the
//! `StdioTransport` without requiring a real external MCP server.
//!
//! A reader thread stamps every inbound line with its arrival time (ms since
//! start) before the main loop handles it, so tests can check that a client
//! never writes a request while an earlier one is still unanswered.
//!
//! # Handled Methods
//!
//! - `initialize` -- responds with protocol version `2024-11-05`.
//! - `notifications/initialized` -- acknowledged silently (no response).
//! - `tools/list` -- returns the tools below.
//! - `tools/call`:
//!   - `echo` -- returns `arguments.message` as a text content item.
//!   - `slow` -- sleeps `arguments.ms`, then returns JSON text with
//!     `received_at_ms` and `replied_at_ms`.
//!   - `chatty` -- emits a notification and a stale response before its reply.
//!   - `env` -- returns the value of environment variable `arguments.name`.
//!   - `fail` -- returns a JSON-RPC error.
//!   - `crash` -- exits without replying.
//! - All other methods -- returns a JSON-RPC `-32601 Method not found` error.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    let start = Instant::now();
    let (tx, rx) = mpsc::channel::<(u64, String)>();

    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let arrived = start.elapsed().as_millis() as u64;
            if tx.send((arrived, line)).is_err() {
                break;
            }
        }
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (received_at, line) in rx {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                eprintln!("mcp_test_server: ignoring malformed line");
                continue;
            }
        };

        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let id = request
            .get("id")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        if method == "notifications/initialized" {
            eprintln!("mcp_test_server: initialized");
            continue;
        }

        let responses = match method {
            "initialize" => vec![handle_initialize(&id)],
            "tools/list" => vec![handle_tools_list(&id)],
            "tools/call" => handle_tools_call(&id, &request, received_at, start),
            _ => vec![make_error(&id, -32601, &format!("Method not found: {}", method))],
        };

        for response in responses {
            if writeln!(out, "{}", response).is_err() || out.flush().is_err() {
                return;
            }
        }
    }
}

/// Handle the `initialize` request.
fn handle_initialize(id: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "mcp-test-server", "version": "0.1.0" }
        }
    })
}

/// Handle the `tools/list` request.
fn handle_tools_list(id: &serde_json::Value) -> serde_json::Value {
    let tool = |name: &str, description: &str| {
        serde_json::json!({
            "name": name,
            "description": description,
            "inputSchema": { "type": "object" }
        })
    };
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "tools": [
                tool("echo", "Echoes input"),
                tool("slow", "Replies after a delay with timing stamps"),
                tool("chatty", "Sends noise before replying"),
                tool("env", "Reads an environment variable"),
                tool("fail", "Always fails"),
                tool("crash", "Exits without replying")
            ]
        }
    })
}

/// Handle the `tools/call` request; may produce several frames.
fn handle_tools_call(
    id: &serde_json::Value,
    request: &serde_json::Value,
    received_at: u64,
    start: Instant,
) -> Vec<serde_json::Value> {
    let params = request.get("params").unwrap_or(&serde_json::Value::Null);
    let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    let arguments = params.get("arguments").unwrap_or(&serde_json::Value::Null);
    let arg_str = |key: &str| {
        arguments
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    match tool_name {
        "echo" => vec![text_result(id, &arg_str("message"))],
        "slow" => {
            let ms = arguments.get("ms").and_then(|v| v.as_u64()).unwrap_or(100);
            thread::sleep(Duration::from_millis(ms));
            let stamps = serde_json::json!({
                "received_at_ms": received_at,
                "replied_at_ms": start.elapsed().as_millis() as u64,
            });
            vec![text_result(id, &stamps.to_string())]
        }
        "chatty" => vec![
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "notifications/message",
                "params": { "level": "info", "data": "working" }
            }),
            serde_json::json!({ "jsonrpc": "2.0", "id": "999", "result": "stale" }),
            text_result(id, "done"),
        ],
        "env" => {
            let value = std::env::var(arg_str("name")).unwrap_or_default();
            vec![text_result(id, &value)]
        }
        "fail" => vec![make_error(id, -32000, "tool failed on purpose")],
        "crash" => std::process::exit(3),
        other => vec![make_error(id, -32602, &format!("Unknown tool: {}", other))],
    }
}

fn text_result(id: &serde_json::Value, text: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "content": [{ "type": "text", "text": text }],
            "isError": false
        }
    })
}

/// Build a JSON-RPC error response.
fn make_error(id: &serde_json::Value, code: i32, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
