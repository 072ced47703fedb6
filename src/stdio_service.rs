use rmcp::{model::*, ServiceExt};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatch::{DispatchError, Dispatcher, ErrorKind};
use crate::AppState;

#[derive(Clone, Debug)]
pub struct McpService {
    pub state: Arc<AppState>,
}

impl McpService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let config = Config::from_env()?;
        info!("Starting Tavily MCP service");
        let state = AppState::from_config(&config)?;
        Ok(Self::new(Arc::new(state)))
    }
}

fn error_data(e: DispatchError) -> ErrorData {
    let code = match e.kind() {
        ErrorKind::MethodNotFound => ErrorCode::METHOD_NOT_FOUND,
        ErrorKind::InvalidParams => ErrorCode::INVALID_PARAMS,
        ErrorKind::InvalidRequest => ErrorCode::INVALID_REQUEST,
        ErrorKind::Internal => {
            error!("Request failed: {}", e);
            ErrorCode::INTERNAL_ERROR
        }
    };
    ErrorData::new(code, e.to_string(), None)
}

/// Builds an rmcp model value from its wire JSON.
fn from_wire<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ErrorData> {
    serde_json::from_value(value).map_err(|e| {
        ErrorData::new(
            ErrorCode::INTERNAL_ERROR,
            format!("Failed to build response: {e}"),
            None,
        )
    })
}

fn to_wire<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ErrorData> {
    serde_json::to_value(value).map_err(|e| {
        ErrorData::new(
            ErrorCode::INTERNAL_ERROR,
            format!("Failed to build response: {e}"),
            None,
        )
    })
}

/// Shapes a dispatcher tool call into the rmcp result. Upstream failures
/// stay in-band (`isError`); everything else becomes a protocol error.
async fn call_tool_result(
    dispatcher: &Dispatcher,
    name: &str,
    arguments: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<CallToolResult, ErrorData> {
    let output = dispatcher
        .call_tool(name, arguments)
        .await
        .map_err(error_data)?;

    let content = vec![Content::text(output.text)];
    if output.is_error {
        Ok(CallToolResult::error(content))
    } else {
        Ok(CallToolResult::success(content))
    }
}

async fn read_resource_result(
    dispatcher: &Dispatcher,
    uri: &str,
) -> Result<ReadResourceResult, ErrorData> {
    let content = dispatcher.read_resource(uri).await.map_err(error_data)?;
    let contents: ResourceContents = from_wire(to_wire(&content)?)?;
    Ok(ReadResourceResult {
        contents: vec![contents],
    })
}

/// Runs `fut` unless the host cancels the request first; dropping the
/// future aborts any in-flight upstream call.
async fn cancellable<T>(
    context: &rmcp::service::RequestContext<rmcp::RoleServer>,
    fut: impl Future<Output = Result<T, ErrorData>>,
) -> Result<T, ErrorData> {
    tokio::select! {
        result = fut => result,
        _ = context.ct.cancelled() => {
            warn!("Request {:?} cancelled by host", context.id);
            Err(ErrorData::new(ErrorCode::INTERNAL_ERROR, "Request cancelled", None))
        }
    }
}

impl rmcp::ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: "tavily-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Web search backed by the Tavily API. Use the `search` tool to run a query; results are cached and can be re-read through the tavily://last-search/result and tavily://search/{query} resources without another API call.".to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self
            .state
            .dispatcher
            .list_tools()
            .into_iter()
            .map(|tool| {
                let input_schema = match tool.input_schema {
                    serde_json::Value::Object(map) => Arc::new(map),
                    _ => Arc::new(serde_json::Map::new()),
                };
                Tool::new(tool.name, tool.description, input_schema)
            })
            .collect();

        Ok(ListToolsResult {
            tools,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        cancellable(
            &context,
            call_tool_result(
                &self.state.dispatcher,
                request.name.as_ref(),
                request.arguments.as_ref(),
            ),
        )
        .await
    }

    async fn list_resources(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let resources = self
            .state
            .dispatcher
            .list_resources()
            .iter()
            .map(|r| to_wire(r).and_then(from_wire::<Resource>))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResourcesResult {
            resources,
            ..Default::default()
        })
    }

    async fn list_resource_templates(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        let resource_templates = self
            .state
            .dispatcher
            .list_resource_templates()
            .iter()
            .map(|t| to_wire(t).and_then(from_wire::<ResourceTemplate>))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResourceTemplatesResult {
            resource_templates,
            ..Default::default()
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        cancellable(
            &context,
            read_resource_result(&self.state.dispatcher, &request.uri),
        )
        .await
    }
}

pub async fn run() -> anyhow::Result<()> {
    let service = McpService::from_env()?;
    // Use the stdio transport from rmcp
    let server = service.serve(rmcp::transport::stdio()).await?;
    info!("MCP stdio server running");
    let quit_reason = server.waiting().await?;
    info!("MCP stdio server stopped: {:?}", quit_reason);
    Ok(())
}
