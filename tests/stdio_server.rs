//! End-to-end tests for the stdio MCP server against a mocked Selin API

use selin_mcp::config::Config;
use selin_mcp::mcp::{Dispatcher, McpServer};
use selin_mcp::upstream::UpstreamClient;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn server_for(uri: &str, timeout: Duration) -> McpServer {
    let mut config = Config::default();
    config.api_base = uri.to_string();
    config.timeout_secs = timeout.as_secs();
    let upstream = UpstreamClient::from_config(&config).unwrap();
    McpServer::new(Dispatcher::new(upstream), &config)
}

/// Feed `input` lines to the server, close stdin, and collect responses by id.
async fn exchange(server: McpServer, input: &[Value]) -> HashMap<String, Value> {
    let (mut client_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, client_out) = tokio::io::duplex(64 * 1024);

    let handle = tokio::spawn(async move { server.serve(BufReader::new(server_in), server_out).await });

    for message in input {
        client_in
            .write_all(format!("{}\n", message).as_bytes())
            .await
            .unwrap();
    }
    drop(client_in);

    let mut responses = HashMap::new();
    let mut lines = BufReader::new(client_out).lines();
    while let Some(line) = lines.next_line().await.unwrap() {
        let value: Value = serde_json::from_str(&line).unwrap();
        responses.insert(value["id"].to_string(), value);
    }

    handle.await.unwrap().unwrap();
    responses
}

fn envelope(is_error: bool, text: &str) -> Value {
    json!({"isError": is_error, "content": [{"type": "text", "text": text}]})
}

#[tokio::test]
async fn test_handshake_list_and_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp/call"))
        .and(body_partial_json(json!({
            "name": "search_selin_content",
            "arguments": {"query": "golang"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(false, "OK")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let server = server_for(&mock_server.uri(), Duration::from_secs(5));
    let responses = exchange(
        server,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0.0.0"}
            }}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
                "name": "search_selin_content",
                "arguments": {"query": "golang"}
            }}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses["1"]["result"]["serverInfo"]["name"], "selin");

    let tools = responses["2"]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 4);

    assert_eq!(
        responses["3"]["result"],
        json!({"content": [{"type": "text", "text": "OK"}], "isError": false})
    );
}

#[tokio::test]
async fn test_failures_stay_inside_tool_results() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp/call"))
        .and(body_partial_json(json!({"name": "get_learning_progress"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(true, "no results")))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp/call"))
        .and(body_partial_json(json!({"name": "analyze_content_trends"})))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let server = server_for(&mock_server.uri(), Duration::from_secs(5));
    let responses = exchange(
        server,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {
                "name": "get_learning_progress", "arguments": {"topic": "rust"}
            }}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
                "name": "analyze_content_trends", "arguments": {"days": 3}
            }}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
                "name": "nonexistent_tool", "arguments": {}
            }}),
            json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}),
        ],
    )
    .await;

    assert_eq!(
        responses["1"]["result"],
        json!({"content": [{"type": "text", "text": "Error: no results"}], "isError": true})
    );

    assert_eq!(responses["2"]["result"]["isError"], true);
    let text = responses["2"]["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("HTTP error 500"), "got: {text}");

    assert_eq!(responses["3"]["result"]["isError"], true);
    assert!(responses["3"]["error"].is_null());

    assert_eq!(responses["4"]["result"], json!({}));
}

#[tokio::test]
async fn test_malformed_line_gets_parse_error() {
    let server = server_for("http://127.0.0.1:1", Duration::from_secs(1));

    let (mut client_in, server_in) = tokio::io::duplex(4096);
    let (server_out, client_out) = tokio::io::duplex(4096);
    let handle = tokio::spawn(async move { server.serve(BufReader::new(server_in), server_out).await });

    client_in.write_all(b"{not json\n\n").await.unwrap();
    drop(client_in);

    let mut lines = BufReader::new(client_out).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["id"], Value::Null);
    assert_eq!(value["error"]["code"], -32700);
    assert!(lines.next_line().await.unwrap().is_none());

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_calls_get_their_own_responses() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp/call"))
        .and(body_partial_json(json!({"arguments": {"hours": 1}})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(false, "last hour"))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp/call"))
        .and(body_partial_json(json!({"arguments": {"hours": 48}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(false, "two days")))
        .mount(&mock_server)
        .await;

    let server = server_for(&mock_server.uri(), Duration::from_secs(5));
    let responses = exchange(
        server,
        &[
            json!({"jsonrpc": "2.0", "id": "slow", "method": "tools/call", "params": {
                "name": "get_recent_content", "arguments": {"hours": 1}
            }}),
            json!({"jsonrpc": "2.0", "id": "fast", "method": "tools/call", "params": {
                "name": "get_recent_content", "arguments": {"hours": 48}
            }}),
        ],
    )
    .await;

    assert_eq!(responses["\"slow\""]["result"]["content"][0]["text"], "last hour");
    assert_eq!(responses["\"fast\""]["result"]["content"][0]["text"], "two days");
}

#[tokio::test]
async fn test_cancelled_request_gets_no_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp/call"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(false, "too late"))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;

    let server = server_for(&mock_server.uri(), Duration::from_secs(30));
    let started = std::time::Instant::now();
    let responses = exchange(
        server,
        &[
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {
                "name": "get_recent_content", "arguments": {}
            }}),
            json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {
                "requestId": 7, "reason": "user aborted"
            }}),
            json!({"jsonrpc": "2.0", "id": 8, "method": "ping"}),
        ],
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!responses.contains_key("7"));
    assert_eq!(responses["8"]["result"], json!({}));
}
