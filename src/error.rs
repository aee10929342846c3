//! Custom error types for selin-mcp

use std::time::Duration;
use thiserror::Error;

/// Main error type for selin-mcp operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Upstream HTTP error {status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("Upstream request timed out after {}s", .0.as_secs())]
    UpstreamTimeout(Duration),

    /// The upstream answered but flagged the call as failed; carries its text verbatim.
    #[error("{0}")]
    UpstreamTool(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

/// Result type alias for selin-mcp
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_tool_error_is_verbatim() {
        let err = Error::UpstreamTool("no results".to_string());
        assert_eq!(err.to_string(), "no results");
    }

    #[test]
    fn test_http_and_timeout_messages() {
        let err = Error::UpstreamHttp {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream HTTP error 500: boom");

        let err = Error::UpstreamTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Upstream request timed out after 30s");
    }
}
