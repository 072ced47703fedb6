use crate::cache::{CacheError, CacheStore};
use crate::resource::{self, LAST_SEARCH_URI, RESOURCE_MIME_TYPE, SEARCH_URI_TEMPLATE};
use crate::search::{SearchProvider, UpstreamError};
use crate::types::*;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

pub const SEARCH_TOOL: &str = "search";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ArgumentError {
    pub field: &'static str,
    pub reason: String,
}

impl ArgumentError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchArguments {
    pub query: String,
    pub search_depth: Option<SearchDepth>,
}

impl SearchArguments {
    /// Checks the raw tool arguments. An absent object is treated as empty.
    pub fn from_arguments(arguments: Option<&Map<String, Value>>) -> Result<Self, ArgumentError> {
        let empty = Map::new();
        let arguments = arguments.unwrap_or(&empty);

        let query = match arguments.get("query") {
            Some(Value::String(q)) => q.clone(),
            Some(_) => return Err(ArgumentError::new("query", "must be a string")),
            None => return Err(ArgumentError::new("query", "is required")),
        };

        let search_depth = match arguments.get("search_depth") {
            None => None,
            Some(Value::String(raw)) => Some(SearchDepth::parse(raw).ok_or_else(|| {
                ArgumentError::new("search_depth", "must be one of \"basic\", \"advanced\"")
            })?),
            Some(_) => {
                return Err(ArgumentError::new(
                    "search_depth",
                    "must be one of \"basic\", \"advanced\"",
                ))
            }
        };

        Ok(Self {
            query,
            search_depth,
        })
    }

    pub fn depth(&self) -> SearchDepth {
        self.search_depth.unwrap_or_default()
    }
}

/// How a failed request is reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MethodNotFound,
    InvalidParams,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[from] ArgumentError),

    #[error("No search results available yet; run a search first")]
    NoSearchYet,

    #[error("Unrecognized resource URI: {0}")]
    UnrecognizedUri(String),

    #[error("Tavily API error: {}", .0.message)]
    Upstream(UpstreamError),

    #[error("Failed to store search result: {0}")]
    Storage(#[from] CacheError),

    #[error("Failed to serialize search result: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::UnknownTool(_) => ErrorKind::MethodNotFound,
            DispatchError::InvalidArguments(_) => ErrorKind::InvalidParams,
            DispatchError::NoSearchYet | DispatchError::UnrecognizedUri(_) => {
                ErrorKind::InvalidRequest
            }
            DispatchError::Upstream(_)
            | DispatchError::Storage(_)
            | DispatchError::Serialize(_) => ErrorKind::Internal,
        }
    }
}

/// Routes the host's requests to the cache and the search provider.
#[derive(Clone)]
pub struct Dispatcher {
    cache: Arc<CacheStore>,
    provider: Arc<dyn SearchProvider>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cache", &self.cache.path())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(cache: Arc<CacheStore>, provider: Arc<dyn SearchProvider>) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: SEARCH_TOOL.to_string(),
            description: "Search the web with Tavily. Returns an AI-generated answer plus ranked results with titles, URLs, content snippets and relevance scores.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to execute"
                    },
                    "search_depth": {
                        "type": "string",
                        "enum": ["basic", "advanced"],
                        "description": "Search depth; \"advanced\" digs deeper at higher cost",
                        "default": "basic"
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<&Map<String, Value>>,
    ) -> Result<ToolOutput, DispatchError> {
        info!("Tool call: {} with args: {:?}", name, arguments);

        if name != SEARCH_TOOL {
            return Err(DispatchError::UnknownTool(name.to_string()));
        }

        let args = SearchArguments::from_arguments(arguments)?;

        match self.provider.search(&args.query, args.depth()).await {
            Ok(result) => {
                self.cache.put(&args.query, result.clone()).await?;
                Ok(ToolOutput::success(serde_json::to_string_pretty(&result)?))
            }
            Err(e) => {
                error!("Search tool error: {}", e);
                Ok(ToolOutput::error(format!(
                    "Tavily API error: {} (status: {})",
                    e.message, e.status
                )))
            }
        }
    }

    pub fn list_resources(&self) -> Vec<ResourceDescriptor> {
        vec![ResourceDescriptor {
            uri: LAST_SEARCH_URI.to_string(),
            name: "Last search result".to_string(),
            description: "The result of the most recent Tavily search".to_string(),
            mime_type: RESOURCE_MIME_TYPE.to_string(),
        }]
    }

    pub fn list_resource_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        vec![ResourceTemplateDescriptor {
            uri_template: SEARCH_URI_TEMPLATE.to_string(),
            name: "Search by query".to_string(),
            description: "Tavily search result for a URL-encoded query; served from cache when available".to_string(),
            mime_type: RESOURCE_MIME_TYPE.to_string(),
        }]
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContent, DispatchError> {
        info!("Resource read: {}", uri);

        let result = resource::resolve(uri, &self.cache, self.provider.as_ref()).await?;

        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: RESOURCE_MIME_TYPE.to_string(),
            text: serde_json::to_string_pretty(&result)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn accepts_query_only() {
        let parsed = SearchArguments::from_arguments(Some(&args(json!({"query": "rust"})))).unwrap();
        assert_eq!(parsed.query, "rust");
        assert_eq!(parsed.search_depth, None);
        assert_eq!(parsed.depth(), SearchDepth::Basic);
    }

    #[test]
    fn accepts_explicit_depth() {
        let parsed = SearchArguments::from_arguments(Some(&args(
            json!({"query": "rust", "search_depth": "advanced"}),
        )))
        .unwrap();
        assert_eq!(parsed.depth(), SearchDepth::Advanced);
    }

    #[test]
    fn rejects_missing_or_non_string_query() {
        let err = SearchArguments::from_arguments(None).unwrap_err();
        assert_eq!(err.field, "query");

        let err = SearchArguments::from_arguments(Some(&args(json!({"query": 123})))).unwrap_err();
        assert_eq!(err.field, "query");
        assert_eq!(err.reason, "must be a string");
    }

    #[test]
    fn rejects_unknown_depth() {
        for depth in [json!("deep"), json!(2), json!(null)] {
            let err = SearchArguments::from_arguments(Some(&args(
                json!({"query": "rust", "search_depth": depth}),
            )))
            .unwrap_err();
            assert_eq!(err.field, "search_depth");
        }
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            DispatchError::UnknownTool("bogus".into()).kind(),
            ErrorKind::MethodNotFound
        );
        assert_eq!(DispatchError::NoSearchYet.kind(), ErrorKind::InvalidRequest);
        assert_eq!(
            DispatchError::Upstream(UpstreamError::new(
                "boom",
                crate::search::UpstreamStatus::Unknown
            ))
            .kind(),
            ErrorKind::Internal
        );
    }
}
