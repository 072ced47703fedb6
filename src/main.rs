use std::sync::Arc;
use tracing::info;

use tavily_mcp::{config::Config, mcp, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tavily_mcp::init_tracing();

    // Get configuration from environment
    let config = Config::from_env()?;

    info!("Starting Tavily MCP HTTP server");

    let state = Arc::new(AppState::from_config(&config)?);
    let app = mcp::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("Tavily MCP server listening on http://{}", config.http_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
