//! Static and forwarded header handling for upstream calls.
//!
//! Three header layers end up on every upstream request, lowest precedence
//! first: static headers from config (`customHeaders` + `HEADER_*` env),
//! preset auth, then credential-bearing headers captured from the inbound
//! tool-protocol request.

use std::collections::HashMap;

/// Marker header added to upstream requests unless suppressed by config.
pub const X_MCP_HEADER: &str = "X-MCP";
pub const X_MCP_VALUE: &str = "1";

const FORWARD_MARKERS: [&str; 4] = ["auth", "key", "api", "cookie"];

/// Whether an inbound header should be forwarded verbatim to the upstream.
///
/// Any header whose name contains `auth`, `key`, `api` or `cookie`
/// (case-insensitive) carries credentials the upstream may depend on.
#[must_use]
pub fn is_forwardable(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    FORWARD_MARKERS.iter().any(|m| lower.contains(m))
}

/// Capture the forwardable subset of inbound headers, preserving order.
#[must_use]
pub fn capture_forwardable<'a>(
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Vec<(String, String)> {
    headers
        .into_iter()
        .filter(|(name, _)| is_forwardable(name))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Static headers attached to every upstream request of a source.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    entries: Vec<(String, String)>,
}

impl StaticHeaders {
    /// Build from `customHeaders` config plus `HEADER_*` environment
    /// variables (`HEADER_X_API_KEY=v` becomes `X-API-KEY: v`).
    #[must_use]
    pub fn from_config(
        custom_headers: &HashMap<String, String>,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut entries: Vec<(String, String)> = custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, value) in env {
            if let Some(name) = key.strip_prefix("HEADER_") {
                if !name.is_empty() {
                    entries.push((name.replace('_', "-"), value));
                }
            }
        }

        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
