pub mod cache;
pub mod config;
pub mod dispatch;
pub mod mcp;
pub mod resource;
pub mod search;
pub mod stdio_service;
pub mod types;

use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug)]
pub struct AppState {
    pub dispatcher: dispatch::Dispatcher,
}

// Re-export the common types for easy access
pub use types::*;

impl AppState {
    pub fn new(dispatcher: dispatch::Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Loads the cache file and builds the Tavily client. Fails if the cache
    /// file cannot be (re)initialized.
    pub fn from_config(config: &config::Config) -> anyhow::Result<Self> {
        let cache = cache::CacheStore::load(&config.cache_path)?;
        info!("Search cache file: {}", cache.path().display());

        let client = search::TavilyClient::new(config)?;
        info!("Tavily API base: {}", client.api_base());

        Ok(Self::new(dispatch::Dispatcher::new(
            Arc::new(cache),
            Arc::new(client),
        )))
    }
}

/// Installs the tracing subscriber. Logs go to stderr so they never mix with
/// protocol traffic on stdout.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
