//! Tool sources and the dispatch-boundary error mapping.
//!
//! The gateway talks to compiled sources through one trait; the wrappers
//! translate each tools-crate error into a JSON-RPC error so no source-level
//! error type ever reaches the transport. Mapping: upstream 400/404 →
//! invalid params; 401/403 → internal with auth text; everything else
//! (5xx, transport failures, timeouts, compiler bugs) → internal. Every
//! mapped error keeps the upstream status and body as structured data.

use crate::config::{GatewayConfig, SourceConfig};
use crate::jsonrpc::JsonRpcError;
use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::{Value, json};
use specgate_graphql_tools::error::GraphqlToolsError;
use specgate_graphql_tools::runtime::GraphqlToolSource;
use specgate_openapi_tools::error::OpenApiToolsError;
use specgate_openapi_tools::runtime::OpenApiToolSource;
use std::sync::Arc;

/// A compiled per-session tool source.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Load the spec and compile tools, forwarding the session's captured
    /// headers on the spec fetch.
    async fn start(&self, session_headers: &[(String, String)]) -> Result<(), JsonRpcError>;

    /// The compiled tools. Read-only after `start`.
    fn list_tools(&self) -> Vec<Tool>;

    /// Dispatch one invocation.
    async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        session_headers: &[(String, String)],
    ) -> Result<CallToolResult, JsonRpcError>;
}

/// Build the (unstarted) source selected by config.
#[must_use]
pub fn build_source(config: &GatewayConfig) -> Arc<dyn ToolSource> {
    match &config.source {
        SourceConfig::OpenApi(api) => Arc::new(OpenApiSource {
            inner: OpenApiToolSource::new("openapi".to_string(), api.clone()),
        }),
        SourceConfig::Graphql(gql) => Arc::new(GraphqlSource {
            inner: GraphqlToolSource::new("graphql".to_string(), gql.clone()),
        }),
    }
}

struct OpenApiSource {
    inner: OpenApiToolSource,
}

#[async_trait]
impl ToolSource for OpenApiSource {
    async fn start(&self, session_headers: &[(String, String)]) -> Result<(), JsonRpcError> {
        self.inner
            .start(session_headers)
            .await
            .map_err(map_openapi_error)
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.inner.list_tools()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        session_headers: &[(String, String)],
    ) -> Result<CallToolResult, JsonRpcError> {
        self.inner
            .call_tool(name, arguments, session_headers)
            .await
            .map_err(map_openapi_error)
    }
}

struct GraphqlSource {
    inner: GraphqlToolSource,
}

#[async_trait]
impl ToolSource for GraphqlSource {
    async fn start(&self, session_headers: &[(String, String)]) -> Result<(), JsonRpcError> {
        self.inner
            .start(session_headers)
            .await
            .map_err(map_graphql_error)
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.inner.list_tools()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        session_headers: &[(String, String)],
    ) -> Result<CallToolResult, JsonRpcError> {
        self.inner
            .call_tool(name, arguments, session_headers)
            .await
            .map_err(map_graphql_error)
    }
}

fn map_upstream_status(status: u16, body: Value) -> JsonRpcError {
    let data = json!({ "status": status, "body": body });
    match status {
        400 | 404 => JsonRpcError::with_data(
            rmcp::model::ErrorCode::INVALID_PARAMS,
            format!("upstream rejected the request ({status})"),
            data,
        ),
        401 | 403 => JsonRpcError::with_data(
            rmcp::model::ErrorCode::INTERNAL_ERROR,
            format!("upstream authentication/authorization failed ({status})"),
            data,
        ),
        _ => JsonRpcError::with_data(
            rmcp::model::ErrorCode::INTERNAL_ERROR,
            format!("upstream returned {status}"),
            data,
        ),
    }
}

pub(crate) fn map_openapi_error(e: OpenApiToolsError) -> JsonRpcError {
    match e {
        OpenApiToolsError::MissingParam(p) => {
            JsonRpcError::invalid_params(format!("missing required parameter: {p}"))
        }
        OpenApiToolsError::UnknownTool(name) => {
            JsonRpcError::method_not_found(format!("unknown tool: {name}"))
        }
        OpenApiToolsError::UpstreamStatus { status, body } => map_upstream_status(status, body),
        OpenApiToolsError::Transport(msg) => {
            JsonRpcError::internal(format!("upstream service unavailable: {msg}"))
        }
        other => JsonRpcError::internal(other.to_string()),
    }
}

pub(crate) fn map_graphql_error(e: GraphqlToolsError) -> JsonRpcError {
    match e {
        GraphqlToolsError::UnknownTool(name) => {
            JsonRpcError::method_not_found(format!("unknown tool: {name}"))
        }
        GraphqlToolsError::UpstreamStatus { status, body } => map_upstream_status(status, body),
        GraphqlToolsError::ExecutionErrors { errors } => JsonRpcError::with_data(
            rmcp::model::ErrorCode::INTERNAL_ERROR,
            "GraphQL execution returned errors with no data".to_string(),
            json!({ "errors": errors }),
        ),
        GraphqlToolsError::Transport(msg) => {
            JsonRpcError::internal(format!("upstream service unavailable: {msg}"))
        }
        other => JsonRpcError::internal(other.to_string()),
    }
}
