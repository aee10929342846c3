//! MCP (Model Context Protocol) server implementation
//!
//! Exposes the Selin knowledge base over stdio to LLM clients.

mod server;
mod tools;
mod types;

pub use server::McpServer;
pub use tools::{get_tool_definitions, Dispatcher, SelinTool};
pub use types::{
    CallToolParams, McpError, McpRequest, McpResponse, ToolContent, ToolDefinition, ToolResult,
    PROTOCOL_VERSION,
};
