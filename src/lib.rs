//! selin-mcp - An MCP server for the Selin knowledge base
//!
//! This crate provides:
//! - A fixed catalog of four knowledge-base tools
//! - A dispatcher that forwards each tool call to the Selin HTTP API
//! - An MCP server over stdio for LLM clients

pub mod config;
pub mod error;
pub mod mcp;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
