//! Default values for configuration

/// Default upstream base URL for local development
pub fn default_api_base() -> String {
    std::env::var("SELIN_API_BASE").unwrap_or_else(|_| "http://localhost:8084".to_string())
}

/// Default per-call upstream timeout in seconds
pub fn default_timeout_secs() -> u64 {
    30
}

/// Server name reported in the MCP initialize handshake
pub fn default_server_name() -> String {
    "selin".to_string()
}
