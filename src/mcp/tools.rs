//! MCP tool definitions and the dispatcher that forwards them upstream

use super::types::{ToolDefinition, ToolResult};
use crate::error::{Error, Result};
use crate::upstream::UpstreamClient;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

/// The fixed set of tools exposed to MCP clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelinTool {
    SearchContent,
    LearningProgress,
    RecentContent,
    AnalyzeTrends,
}

/// Tool name as advertised to clients, and the discriminator sent upstream.
static TOOL_TABLE: [(SelinTool, &str, &str); 4] = [
    (SelinTool::SearchContent, "search_selin_content", "search_selin_content"),
    (SelinTool::LearningProgress, "get_learning_progress", "get_learning_progress"),
    (SelinTool::RecentContent, "get_recent_content", "get_recent_content"),
    (SelinTool::AnalyzeTrends, "analyze_content_trends", "analyze_content_trends"),
];

const PLATFORMS: [&str; 4] = ["reddit", "slack", "file_upload", "all"];

impl SelinTool {
    /// All tools, in catalog order
    pub const ALL: [SelinTool; 4] = [
        SelinTool::SearchContent,
        SelinTool::LearningProgress,
        SelinTool::RecentContent,
        SelinTool::AnalyzeTrends,
    ];

    // Rows are in declaration order
    fn entry(self) -> &'static (SelinTool, &'static str, &'static str) {
        &TOOL_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.entry().1
    }

    pub fn discriminator(self) -> &'static str {
        self.entry().2
    }

    pub fn description(self) -> &'static str {
        match self {
            SelinTool::SearchContent => {
                "Search Selin's knowledge base for content related to Go, blockchain, or cryptography"
            }
            SelinTool::LearningProgress => "Get the user's learning progress for specific topics",
            SelinTool::RecentContent => "Get recently collected content from Selin's knowledge base",
            SelinTool::AnalyzeTrends => "Analyze trends in collected content and learning topics",
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            SelinTool::SearchContent => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query (e.g., 'golang concurrency', 'cosmos blockchain')"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of results to return",
                        "default": 10
                    },
                    "platform": {
                        "type": "string",
                        "description": "Filter by source platform",
                        "enum": PLATFORMS,
                        "default": "all"
                    }
                },
                "required": ["query"]
            }),
            SelinTool::LearningProgress => json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "Learning topic (e.g., 'golang', 'blockchain', 'cryptography')"
                    }
                },
                "required": ["topic"]
            }),
            SelinTool::RecentContent => json!({
                "type": "object",
                "properties": {
                    "hours": {
                        "type": "number",
                        "description": "Number of hours back to look",
                        "default": 24
                    },
                    "platform": {
                        "type": "string",
                        "description": "Filter by source platform",
                        "enum": PLATFORMS,
                        "default": "all"
                    }
                }
            }),
            SelinTool::AnalyzeTrends => json!({
                "type": "object",
                "properties": {
                    "days": {
                        "type": "number",
                        "description": "Number of days to analyze",
                        "default": 7
                    },
                    "topic": {
                        "type": "string",
                        "description": "Focus on specific topic"
                    }
                }
            }),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

impl FromStr for SelinTool {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        TOOL_TABLE
            .iter()
            .find(|(_, name, _)| *name == value)
            .map(|(tool, _, _)| *tool)
            .ok_or_else(|| Error::UnknownTool(value.to_string()))
    }
}

impl fmt::Display for SelinTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Get all available tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    SelinTool::ALL.iter().map(|tool| tool.definition()).collect()
}

/// Routes tool calls to the upstream API.
///
/// Holds only the immutable catalog and the upstream client, so one instance
/// can serve any number of concurrent calls.
pub struct Dispatcher {
    upstream: UpstreamClient,
    catalog: Vec<ToolDefinition>,
}

impl Dispatcher {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self {
            upstream,
            catalog: get_tool_definitions(),
        }
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn list_tools(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    /// Handle a tool call. Failures come back as an error result, never as `Err`.
    pub async fn call_tool(&self, name: &str, arguments: &HashMap<String, Value>) -> ToolResult {
        info!("Tool called: {} with arguments: {:?}", name, arguments);

        match self.forward(name, arguments).await {
            Ok(text) => ToolResult::text(text),
            Err(e) => {
                error!("Tool call failed: {}", e);
                ToolResult::error(e)
            }
        }
    }

    async fn forward(&self, name: &str, arguments: &HashMap<String, Value>) -> Result<String> {
        let tool: SelinTool = name.parse()?;
        self.upstream.call(tool.discriminator(), arguments).await
    }
}
