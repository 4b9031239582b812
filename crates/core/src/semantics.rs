//! HTTP-method semantics for tool annotations.

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Derive MCP tool annotations from the HTTP method an operation uses.
///
/// `openWorldHint` is always `true`: these tools talk to an external API.
/// Unknown methods set nothing else.
#[must_use]
pub fn annotations_for_method(method: &Method) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match *method {
        Method::GET | Method::HEAD | Method::OPTIONS => {
            (Some(true), Some(false), Some(true))
        }
        Method::POST => (Some(false), Some(false), Some(false)),
        Method::PUT | Method::DELETE => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent; do not guess.
        Method::PATCH => (Some(false), Some(true), None),
        _ => (None, None, None),
    };

    ToolAnnotations {
        title: None,
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}
