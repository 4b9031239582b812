//! Server-sent-events transport.
//!
//! `GET /mcp` allocates a session and opens its event stream: an `endpoint`
//! event first (telling the client where to POST), then one `message` event
//! per JSON-RPC response. Dropping the stream is the session's close signal.

use super::{McpState, SESSION_ID_HEADER, captured_headers};
use crate::jsonrpc::JsonRpcRequest;
use crate::session::SessionRegistry;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt as _;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Closes the session when the client drops the event stream.
struct CloseOnDrop {
    sessions: Arc<SessionRegistry>,
    session_id: String,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.sessions.close(&self.session_id);
    }
}

pub(super) fn open_stream(state: McpState, headers: &HeaderMap) -> Response {
    let session = state.sessions.create(captured_headers(headers));
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    session.attach_outbox(tx);

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/mcp?sessionId={}", session.id));

    let guard = CloseOnDrop {
        sessions: state.sessions.clone(),
        session_id: session.id.clone(),
    };
    let frames = UnboundedReceiverStream::new(rx).map(move |frame| {
        // The guard lives as long as the stream does.
        let _keep_alive = &guard;
        Ok::<Event, Infallible>(Event::default().event("message").data(frame))
    });

    let stream =
        futures::stream::once(async move { Ok::<Event, Infallible>(endpoint) }).chain(frames);

    (
        [(SESSION_ID_HEADER, session.id.clone())],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

pub(super) fn post(
    state: McpState,
    query: &HashMap<String, String>,
    body: &str,
) -> Response {
    let Some(session_id) = query.get("sessionId") else {
        return (StatusCode::BAD_REQUEST, "missing sessionId").into_response();
    };
    let Some(session) = state.sessions.get(session_id) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };

    let request: JsonRpcRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid JSON-RPC: {e}")).into_response();
        }
    };

    // Responses flow on the event stream; the POST just acknowledges.
    tokio::spawn(async move {
        if let Some(response) = super::process_message(&state, &session, request).await {
            let frame = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
            if !session.push_frame(frame) {
                tracing::warn!(session_id = %session.id, "event stream gone; response dropped");
            }
        }
    });

    StatusCode::ACCEPTED.into_response()
}
