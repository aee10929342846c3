//! selin-mcp entry point

use clap::Parser;
use selin_mcp::{
    config::Config,
    error::Result,
    mcp::{Dispatcher, McpServer},
    upstream::UpstreamClient,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "selin-mcp")]
#[command(version, about = "MCP server exposing the Selin knowledge base", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "SELIN_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the Selin API
    #[arg(long, env = "SELIN_API_BASE")]
    api_base: Option<String>,

    /// Upstream call timeout in seconds
    #[arg(long, env = "SELIN_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "SELIN_MCP_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for protocol traffic
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = load_config(&cli)?;
    info!("Starting Selin MCP Server (upstream {})", config.api_base);

    let upstream = UpstreamClient::from_config(&config)?;
    let server = McpServer::new(Dispatcher::new(upstream), &config);
    server.spawn_health_check();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

/// Load the config file (if any) and apply command-line overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    if let Some(api_base) = &cli.api_base {
        config.api_base = api_base.clone();
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        config.timeout_secs = timeout_secs;
    }

    config.validate()?;
    Ok(config)
}
