use crate::config::Config;
use crate::types::*;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const FALLBACK_ERROR_MESSAGE: &str = "Unknown error";
pub const TIMEOUT_ERROR_MESSAGE: &str = "request timed out";

/// HTTP status of a failed upstream call, when one was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Code(u16),
    Unknown,
}

impl fmt::Display for UpstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamStatus::Code(code) => write!(f, "{code}"),
            UpstreamStatus::Unknown => f.write_str("unknown"),
        }
    }
}

/// The single failure shape every upstream problem is folded into.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (status: {status})")]
pub struct UpstreamError {
    pub message: String,
    pub status: UpstreamStatus,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>, status: UpstreamStatus) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::new(TIMEOUT_ERROR_MESSAGE, UpstreamStatus::Unknown);
        }
        let status = e
            .status()
            .map(|s| UpstreamStatus::Code(s.as_u16()))
            .unwrap_or(UpstreamStatus::Unknown);
        let message = e.to_string();
        if message.trim().is_empty() {
            Self::new(FALLBACK_ERROR_MESSAGE, status)
        } else {
            Self::new(message, status)
        }
    }

    /// Picks the most specific message out of an error response body:
    /// `message`, then `error`, then Tavily's `detail` envelope, then a
    /// generic status line.
    fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: TavilyErrorBody = serde_json::from_str(body).unwrap_or_default();

        let message = text_of(parsed.message.as_ref())
            .or_else(|| text_of(parsed.error.as_ref()))
            .or_else(|| {
                parsed.detail.as_ref().and_then(|detail| {
                    text_of(Some(detail))
                        .or_else(|| text_of(detail.get("error")))
                        .or_else(|| text_of(detail.get("message")))
                })
            })
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

        Self::new(message, UpstreamStatus::Code(status.as_u16()))
    }
}

fn text_of(value: Option<&serde_json::Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Something that can run a web search. Implemented by [`TavilyClient`];
/// tests substitute counting stubs.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, depth: SearchDepth) -> Result<SearchResult, UpstreamError>;
}

#[derive(Clone, Debug)]
pub struct TavilyClient {
    http_client: Client,
    api_base: String,
    api_key: SecretString,
}

impl TavilyClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self::with_client(
            http_client,
            config.api_base.clone(),
            config.api_key.clone(),
        ))
    }

    pub fn with_client(http_client: Client, api_base: String, api_key: SecretString) -> Self {
        Self {
            http_client,
            api_base,
            api_key,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str, depth: SearchDepth) -> Result<SearchResult, UpstreamError> {
        info!("Searching Tavily for: {} (depth: {})", query, depth);

        let search_url = format!("{}/search", self.api_base);
        debug!("Search URL: {}", search_url);

        let body = TavilySearchRequest {
            api_key: self.api_key.expose_secret(),
            query,
            search_depth: depth,
            include_answer: true,
            include_raw_content: false,
        };

        let resp = self
            .http_client
            .post(&search_url)
            .header("User-Agent", "tavily-mcp/0.1")
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Tavily request failed to send: {}", e);
                UpstreamError::from_transport(&e)
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            warn!("Failed to read Tavily response body: {}", e);
            UpstreamError::from_transport(&e)
        })?;

        if !status.is_success() {
            let err = UpstreamError::from_response(status, &text);
            warn!("Tavily returned {}: {}", status, err.message);
            return Err(err);
        }

        let result: SearchResult = serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse Tavily response: {}", e);
            UpstreamError::new(
                format!("Failed to parse search response: {e}"),
                UpstreamStatus::Code(status.as_u16()),
            )
        })?;

        info!("Tavily returned {} results", result.results.len());
        Ok(result)
    }
}
