use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const TAVILY_DEFAULT_BASE: &str = "https://api.tavily.com";
pub const DEFAULT_CACHE_FILE: &str = "tavily-search-cache.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:5000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TAVILY_API_KEY environment variable is required")]
    MissingApiKey,

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration, read once at startup.
///
/// Debug output redacts `api_key` via [`SecretString`].
#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub api_base: String,
    pub cache_path: PathBuf,
    pub request_timeout: Duration,
    pub http_addr: String,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// - `TAVILY_API_KEY` (required)
    /// - `TAVILY_BASE_URL` (defaults to `https://api.tavily.com`)
    /// - `TAVILY_CACHE_FILE` (defaults to `tavily-search-cache.json`)
    /// - `TAVILY_TIMEOUT_SECS` (defaults to 30)
    /// - `MCP_HTTP_ADDR` (defaults to `0.0.0.0:5000`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("TAVILY_API_KEY")
            .map(SecretString::from)
            .ok_or(ConfigError::MissingApiKey)?;

        let api_base = var("TAVILY_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| TAVILY_DEFAULT_BASE.to_string());

        let cache_path = var("TAVILY_CACHE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE));

        let request_timeout = match var("TAVILY_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "TAVILY_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let http_addr = var("MCP_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());

        Ok(Self {
            api_key,
            api_base,
            cache_path,
            request_timeout,
            http_addr,
        })
    }
}
