//! Integration tests for the stdio transport against `mcp_test_server`.

use std::sync::Arc;
use std::time::Duration;

use mcp_bridge::mcp::facade::{StdioToolClient, ToolInvoker};
use mcp_bridge::mcp::transport::stdio::StdioTransport;
use mcp_bridge::BridgeError;
use serde_json::json;

mod common;

async fn started(name: &str) -> StdioTransport {
    let transport = StdioTransport::new(common::test_server_config(name));
    transport.start().await.expect("test server should start");
    transport
}

#[tokio::test]
async fn test_handshake_then_echo() {
    let transport = started("demo").await;
    assert!(transport.is_ready().await);

    let text = transport
        .call_tool("echo", json!({"message": "hello"}))
        .await
        .unwrap();
    assert_eq!(text, "hello");

    transport.stop().await;
    assert!(!transport.is_ready().await);
}

#[tokio::test]
async fn test_start_twice_is_noop() {
    let transport = started("demo").await;
    transport.start().await.unwrap();
    let text = transport
        .call_tool("echo", json!({"message": "again"}))
        .await
        .unwrap();
    assert_eq!(text, "again");
    transport.stop().await;
}

#[tokio::test]
async fn test_list_tools() {
    let transport = started("demo").await;
    let tools = transport.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"echo"));
    assert!(names.contains(&"slow"));
    transport.stop().await;
}

#[tokio::test]
async fn test_noise_before_reply_is_skipped() {
    let transport = started("demo").await;
    let text = transport.call_tool("chatty", json!({})).await.unwrap();
    assert_eq!(text, "done");

    // The stream is still in sync for the next call.
    let text = transport
        .call_tool("echo", json!({"message": "after"}))
        .await
        .unwrap();
    assert_eq!(text, "after");
    transport.stop().await;
}

#[tokio::test]
async fn test_tool_error_is_remote() {
    let transport = started("demo").await;
    let err = transport.call_tool("fail", json!({})).await.unwrap_err();
    match err.downcast_ref::<BridgeError>() {
        Some(BridgeError::Remote { code, message, .. }) => {
            assert_eq!(*code, -32000);
            assert!(message.contains("on purpose"));
        }
        other => panic!("expected Remote, got {:?}", other),
    }
    transport.stop().await;
}

#[tokio::test]
async fn test_crash_is_process_terminated() {
    let transport = started("demo").await;
    let err = transport.call_tool("crash", json!({})).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::ProcessTerminated { .. })
    ));
    transport.stop().await;
}

#[tokio::test]
async fn test_env_override_reaches_server() {
    let config = common::test_server_config("demo").with_env("BRIDGE_TEST_TOKEN", "s3cret");
    let transport = StdioTransport::new(config);
    transport.start().await.unwrap();

    let text = transport
        .call_tool("env", json!({"name": "BRIDGE_TEST_TOKEN"}))
        .await
        .unwrap();
    assert_eq!(text, "s3cret");
    transport.stop().await;
}

#[tokio::test]
async fn test_call_before_start_is_not_started() {
    let transport = StdioTransport::new(common::test_server_config("demo"));
    let err = transport
        .call_tool("echo", json!({"message": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::NotStarted { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_calls_are_serialized() {
    let transport = Arc::new(started("demo").await);

    let a = {
        let t = Arc::clone(&transport);
        tokio::spawn(async move { t.call_tool("slow", json!({"ms": 300})).await })
    };
    let b = {
        let t = Arc::clone(&transport);
        tokio::spawn(async move { t.call_tool("slow", json!({"ms": 300})).await })
    };

    let stamps = |text: String| -> (u64, u64) {
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        (
            v["received_at_ms"].as_u64().unwrap(),
            v["replied_at_ms"].as_u64().unwrap(),
        )
    };
    let mut calls = vec![
        stamps(a.await.unwrap().unwrap()),
        stamps(b.await.unwrap().unwrap()),
    ];
    calls.sort();

    let (_, first_replied) = calls[0];
    let (second_received, _) = calls[1];
    assert!(
        second_received >= first_replied,
        "second request arrived at {} before first reply at {}",
        second_received,
        first_replied
    );
    transport.stop().await;
}

#[tokio::test]
async fn test_stdio_client_starts_lazily() {
    let client = StdioToolClient::new(vec![common::test_server_config("demo")]);
    assert_eq!(client.server_names(), vec!["demo".to_string()]);

    let text = client
        .call_tool("demo", "echo", json!({"message": "lazy"}))
        .await
        .unwrap();
    assert_eq!(text, "lazy");

    let transport = client.transport("demo").await.unwrap();
    assert!(transport.is_ready().await);

    client.shutdown().await;
    assert!(!transport.is_ready().await);
}

#[tokio::test]
async fn test_stdio_client_read_timeout() {
    let config = common::test_server_config("demo").with_read_timeout(Duration::from_millis(200));
    let client = StdioToolClient::new(vec![config]);
    let err = client
        .call_tool("demo", "slow", json!({"ms": 2000}))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::Timeout { .. })
    ));
    client.shutdown().await;
}
