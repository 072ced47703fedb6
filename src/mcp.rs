use crate::dispatch::{ArgumentError, DispatchError, ErrorKind};
use crate::types::*;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct McpToolsResponse {
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpCallRequest {
    pub name: String,
    /// Kept untyped so a non-object reaches validation instead of failing extraction.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl McpCallRequest {
    fn arguments(
        &self,
    ) -> Result<Option<&serde_json::Map<String, serde_json::Value>>, DispatchError> {
        match &self.arguments {
            serde_json::Value::Object(map) => Ok(Some(map)),
            serde_json::Value::Null => Ok(None),
            _ => Err(ArgumentError::new("arguments", "must be an object").into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpCallResponse {
    pub content: Vec<McpContent>,
    pub is_error: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpResourcesResponse {
    pub resources: Vec<ResourceDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpResourceTemplatesResponse {
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpReadRequest {
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpReadResponse {
    pub contents: Vec<ResourceContent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: DispatchError) -> ApiError {
    let (status, code) = match e.kind() {
        ErrorKind::MethodNotFound => (StatusCode::NOT_FOUND, "method_not_found"),
        ErrorKind::InvalidParams => (StatusCode::BAD_REQUEST, "invalid_params"),
        ErrorKind::InvalidRequest => (StatusCode::BAD_REQUEST, "invalid_request"),
        ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/mcp/tools", get(list_tools))
        .route("/mcp/call", post(call_tool))
        .route("/mcp/resources", get(list_resources))
        .route("/mcp/resource-templates", get(list_resource_templates))
        .route("/mcp/resources/read", post(read_resource))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tavily-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<McpToolsResponse> {
    Json(McpToolsResponse {
        tools: state.dispatcher.list_tools(),
    })
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpCallRequest>,
) -> Result<Json<McpCallResponse>, ApiError> {
    let arguments = request.arguments().map_err(api_error)?;
    let output = state
        .dispatcher
        .call_tool(&request.name, arguments)
        .await
        .map_err(api_error)?;

    Ok(Json(McpCallResponse {
        content: vec![McpContent {
            content_type: "text".to_string(),
            text: output.text,
        }],
        is_error: output.is_error,
    }))
}

pub async fn list_resources(State(state): State<Arc<AppState>>) -> Json<McpResourcesResponse> {
    Json(McpResourcesResponse {
        resources: state.dispatcher.list_resources(),
    })
}

pub async fn list_resource_templates(
    State(state): State<Arc<AppState>>,
) -> Json<McpResourceTemplatesResponse> {
    Json(McpResourceTemplatesResponse {
        resource_templates: state.dispatcher.list_resource_templates(),
    })
}

pub async fn read_resource(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpReadRequest>,
) -> Result<Json<McpReadResponse>, ApiError> {
    let content = state
        .dispatcher
        .read_resource(&request.uri)
        .await
        .map_err(api_error)?;

    Ok(Json(McpReadResponse {
        contents: vec![content],
    }))
}
