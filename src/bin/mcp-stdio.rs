use tavily_mcp::stdio_service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tavily_mcp::init_tracing();
    stdio_service::run().await
}
