//! The `/mcp` endpoint.
//!
//! Two transports share the endpoint, selected by config:
//! - streaming HTTP: `POST /mcp` carries one JSON-RPC message; the response
//!   is framed as a single-message SSE body; the `mcp-session-id` header
//!   allocates or continues a session.
//! - SSE: `GET /mcp` opens the event stream and allocates a session;
//!   `POST /mcp?sessionId=...` delivers client messages whose responses
//!   flow on the stream.
//!
//! `DELETE /mcp` is not allowed. CORS is wide open with `mcp-session-id`
//! exposed so browser clients can read the allocated session.

pub mod sse;

use crate::config::{GatewayConfig, TransportKind};
use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::session::{SessionRegistry, SessionState};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use rmcp::model::ErrorCode;
use serde_json::{Value, json};
use specgate_core::headers::capture_forwardable;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2025-03-26";

#[derive(Clone)]
pub struct McpState {
    pub config: Arc<GatewayConfig>,
    pub sessions: Arc<SessionRegistry>,
}

/// Build the gateway router: `/mcp` plus a readiness probe.
pub fn router(state: McpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)]);

    Router::new()
        .route(
            "/mcp",
            get(mcp_get).post(mcp_post).delete(mcp_delete),
        )
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn mcp_delete() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

async fn mcp_get(State(state): State<McpState>, headers: HeaderMap) -> Response {
    match state.config.transport {
        TransportKind::Stream => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        TransportKind::Sse => sse::open_stream(state, &headers),
    }
}

async fn mcp_post(
    State(state): State<McpState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    match state.config.transport {
        TransportKind::Stream => stream_post(state, &headers, &body).await,
        TransportKind::Sse => sse::post(state, &query, &body),
    }
}

/// Streaming transport: one JSON-RPC message per POST, answered with a
/// single-message SSE body.
async fn stream_post(state: McpState, headers: &HeaderMap, body: &str) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => {
            let error = JsonRpcError::new(ErrorCode::PARSE_ERROR, format!("invalid JSON-RPC: {e}"));
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(JsonRpcResponse::failure(None, error)),
            )
                .into_response();
        }
    };

    let session_id = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let session = state
        .sessions
        .get_or_create(session_id, captured_headers(headers));

    match process_message(&state, &session, request).await {
        Some(response) => sse_single_message(&response, &session.id),
        None => accepted(&session.id),
    }
}

pub(crate) fn captured_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    capture_forwardable(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
}

fn accepted(session_id: &str) -> Response {
    (StatusCode::ACCEPTED, [(SESSION_ID_HEADER, session_id)]).into_response()
}

fn sse_single_message(response: &JsonRpcResponse, session_id: &str) -> Response {
    let payload = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string());
    let body = format!("event: message\ndata: {payload}\n\n");
    (
        StatusCode::OK,
        [
            ("content-type", "text/event-stream"),
            ("cache-control", "no-store"),
            (SESSION_ID_HEADER, session_id),
        ],
        body,
    )
        .into_response()
}

/// Dispatch one inbound message. Notifications produce no response.
pub(crate) async fn process_message(
    state: &McpState,
    session: &SessionState,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        return None;
    }

    let id = request.id.clone();
    let result = dispatch(state, session, &request).await;
    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn dispatch(
    state: &McpState,
    session: &SessionState,
    request: &JsonRpcRequest,
) -> Result<Value, JsonRpcError> {
    match request.method.as_str() {
        "initialize" => Ok(initialize_result(request)),
        "ping" => Ok(json!({})),
        "tools/list" => {
            let registry = session.registry(&state.config).await?;
            let tools = serde_json::to_value(registry.tools())
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => call_tool(state, session, request.params.as_ref()).await,
        other => Err(JsonRpcError::method_not_found(format!(
            "unknown method: {other}"
        ))),
    }
}

fn initialize_result(request: &JsonRpcRequest) -> Value {
    let requested_version = request
        .params
        .as_ref()
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": requested_version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "specgate-gateway",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn call_tool(
    state: &McpState,
    session: &SessionState,
    params: Option<&Value>,
) -> Result<Value, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    let registry = session.registry(&state.config).await?;

    // A session-close signal aborts the in-flight upstream call; its result
    // is discarded.
    let result = tokio::select! {
        result = registry.invoke(name, &arguments, session.headers()) => result?,
        () = session.cancel.cancelled() => {
            return Err(JsonRpcError::internal("session closed during call"));
        }
    };

    serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
}
