//! MCP stdio server implementation

use super::tools::Dispatcher;
use super::types::{
    CallToolParams, CancelledParams, InitializeResult, McpError, McpMessage, McpNotification,
    McpRequest, McpResponse, ServerCapabilities, ServerInfo, ToolsCapability, PROTOCOL_VERSION,
};
use crate::config::Config;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Requests still being handled, keyed by their serialized JSON-RPC id
type InFlight = Arc<Mutex<HashMap<String, AbortHandle>>>;

/// MCP Server implementation
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    server_info: ServerInfo,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(dispatcher: Dispatcher, config: &Config) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            server_info: ServerInfo {
                name: config.server_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Check the upstream in the background and log the outcome.
    ///
    /// Never delays the protocol loop; a dead upstream only produces a warning.
    pub fn spawn_health_check(&self) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            match dispatcher.upstream().health().await {
                Ok(health) => info!(
                    "Upstream {} {} is {} as of {} (tools: {})",
                    health.service.as_deref().unwrap_or("selin"),
                    health.version.as_deref().unwrap_or("unknown"),
                    health.status,
                    health
                        .timestamp
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string()),
                    health.tools.join(", ")
                ),
                Err(e) => warn!("Upstream health check failed: {}", e),
            }
        })
    }

    /// Run the MCP server loop over stdio
    pub async fn run(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    /// Serve line-delimited JSON-RPC from `reader` until EOF.
    ///
    /// Every request runs in its own task; responses are funnelled through one
    /// writer so each line on `writer` is a complete message.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_responses(writer, rx));
        let in_flight: InFlight = Arc::default();
        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();

        info!("MCP server starting on stdio");

        while let Some(line) = lines.next_line().await? {
            while tasks.try_join_next().is_some() {}

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            let message: McpMessage = match serde_json::from_str(line) {
                Ok(m) => m,
                Err(e) => {
                    error!("Failed to parse message: {}", e);
                    let response = McpResponse::error(
                        Value::Null,
                        McpError::parse_error(format!("Parse error: {}", e)),
                    );
                    send(&tx, &response);
                    continue;
                }
            };

            match message {
                McpMessage::Request(req) => self.spawn_request(req, &mut tasks, &in_flight, &tx),
                McpMessage::Notification(notif) => self.handle_notification(notif, &in_flight),
                McpMessage::Response(resp) => {
                    warn!("Unexpected response message received (id {})", resp.id);
                }
            }
        }

        debug!("Input closed with {} request(s) in flight", tasks.len());
        while tasks.join_next().await.is_some() {}

        drop(tx);
        writer_task
            .await
            .map_err(|e| Error::McpProtocol(format!("Writer task failed: {}", e)))??;

        info!("MCP server shutting down");
        Ok(())
    }

    fn spawn_request(
        &self,
        request: McpRequest,
        tasks: &mut JoinSet<()>,
        in_flight: &InFlight,
        tx: &mpsc::UnboundedSender<String>,
    ) {
        let key = request.id.to_string();
        let task_key = key.clone();
        let server = self.clone();
        let registry = Arc::clone(in_flight);
        let tx = tx.clone();

        // Hold the lock across spawn so the task cannot deregister before it is registered
        let mut pending = lock(in_flight);
        if pending.contains_key(&key) {
            warn!("Rejecting request {}: id already in flight", key);
            let response = McpResponse::error(
                request.id,
                McpError::invalid_request(format!("Request id {} is already in flight", key)),
            );
            send(&tx, &response);
            return;
        }

        let handle = tasks.spawn(async move {
            let response = server.handle_request(request).await;
            lock(&registry).remove(&task_key);
            send(&tx, &response);
        });
        pending.insert(key, handle);
    }

    /// Handle an MCP request
    async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone();

        if request.jsonrpc != "2.0" {
            return McpResponse::error(
                id,
                McpError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => McpResponse::success(id, json!({ "resources": [] })),
            "prompts/list" => McpResponse::success(id, json!({ "prompts": [] })),
            _ => McpResponse::error(id, McpError::method_not_found(&request.method)),
        }
    }

    /// Handle notifications (fire-and-forget)
    fn handle_notification(&self, notification: McpNotification, in_flight: &InFlight) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                let params = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                let Some(params) = params else {
                    warn!("Cancellation without a valid requestId");
                    return;
                };

                match lock(in_flight).remove(&params.request_id.to_string()) {
                    Some(handle) => {
                        handle.abort();
                        info!(
                            "Request {} cancelled: {}",
                            params.request_id,
                            params.reason.as_deref().unwrap_or("no reason given")
                        );
                    }
                    None => debug!("Cancellation for finished request {}", params.request_id),
                }
            }
            _ => {
                debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Value) -> McpResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.server_info.clone(),
        };
        to_response(id, &result)
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Value) -> McpResponse {
        McpResponse::success(id, json!({ "tools": self.dispatcher.list_tools() }))
    }

    /// Handle tools/call request
    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> McpResponse {
        let params = match params {
            Some(p) => p,
            None => return McpResponse::error(id, McpError::invalid_params("Missing params")),
        };

        let call = match CallToolParams::from_params(&params) {
            Ok(call) => call,
            Err(e) => return McpResponse::error(id, e),
        };

        let result = self.dispatcher.call_tool(&call.name, &call.arguments).await;
        to_response(id, &result)
    }
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<String, AbortHandle>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_response(id: Value, result: &impl Serialize) -> McpResponse {
    match serde_json::to_value(result) {
        Ok(value) => McpResponse::success(id, value),
        Err(e) => McpResponse::error(id, McpError::internal_error(e.to_string())),
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &McpResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).is_err() {
                warn!("Response dropped: output closed");
            }
        }
        Err(e) => error!("Failed to serialize response: {}", e),
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        debug!("Sending: {}", line);
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}
