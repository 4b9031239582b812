//! Integration-test helpers: in-process stub upstream servers, an SSE
//! reader, and HTTP readiness polling.

use anyhow::Context as _;
use axum::Router;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One request as seen by a [`StubServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Decides the stub's answer for one recorded request.
pub type Responder = Arc<dyn Fn(&RecordedRequest) -> (u16, Value) + Send + Sync>;

type Shared = (Arc<Mutex<Vec<RecordedRequest>>>, Responder);

/// Minimal in-process upstream: records every request and answers through
/// the provided responder.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    /// Bind an ephemeral port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(responder: Responder) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind stub listener")?;
        let addr = listener.local_addr()?;
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));

        let state: Shared = (requests.clone(), responder);
        let app = Router::new().fallback(record_and_answer).with_state(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            requests,
        })
    }

    /// Everything received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

async fn record_and_answer(State((requests, responder)): State<Shared>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, 1024 * 1024).await.unwrap_or_default();

    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts
            .headers
            .iter()
            .filter_map(|(n, v)| v.to_str().ok().map(|v| (n.to_string(), v.to_string())))
            .collect(),
        body: String::from_utf8_lossy(&bytes).to_string(),
    };

    let (status, body) = responder(&recorded);
    requests.lock().push(recorded);

    (
        axum::http::StatusCode::from_u16(status).unwrap_or(axum::http::StatusCode::OK),
        axum::Json(body),
    )
        .into_response()
}

/// Poll an HTTP URL until it answers with a success status.
///
/// # Errors
///
/// Returns an error when the timeout elapses first.
pub async fn wait_http_ok(url: &str, timeout: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            anyhow::bail!("timed out waiting for {url}");
        }
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
}

/// One parsed server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental SSE reader over a streaming HTTP response.
pub struct SseReader {
    response: reqwest::Response,
    buffer: String,
}

impl SseReader {
    #[must_use]
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Read the next event, skipping keep-alive comments.
    ///
    /// # Errors
    ///
    /// Returns an error when the stream ends or the read times out.
    pub async fn next_event(&mut self, timeout: Duration) -> anyhow::Result<SseEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(block) = self.take_block() {
                if let Some(event) = parse_block(&block) {
                    return Ok(event);
                }
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            anyhow::ensure!(!remaining.is_zero(), "timed out reading SSE event");
            let chunk = tokio::time::timeout(remaining, self.response.chunk())
                .await
                .context("timed out reading SSE event")??
                .context("SSE stream ended")?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    fn take_block(&mut self) -> Option<String> {
        let end = self.buffer.find("\n\n")?;
        let block = self.buffer[..end].to_string();
        self.buffer.drain(..end + 2);
        Some(block)
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut has_data = false;
    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event.event = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            if has_data {
                event.data.push('\n');
            }
            event.data.push_str(value.trim_start());
            has_data = true;
        }
        // Comment lines (":keep-alive") are ignored.
    }
    has_data.then_some(event)
}
