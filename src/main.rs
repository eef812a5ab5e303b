//! MCP server entry point.
//!
//! Logs go to stderr; stdout carries nothing but JSON-RPC lines.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    lookin_mcp::mcp::serve_stdio().await?;
    Ok(())
}
