use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for an OpenAPI-backed tool source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSourceConfig {
    /// OpenAPI spec location (URL or file path).
    pub spec: String,

    /// Ordered overlay locations applied on top of the spec.
    #[serde(default)]
    pub overlays: Vec<String>,

    /// Override base URL from spec.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Retain only matching operations (operationId glob or `METHOD:/path`).
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Remove matching operations; consulted only when the whitelist is empty.
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Bare upstream API key (used when no scheme credential matches).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name of the security scheme whose credential should be used.
    #[serde(default)]
    pub security_scheme_name: Option<String>,

    /// Credentials keyed by security scheme name.
    #[serde(default)]
    pub security_credentials: HashMap<String, String>,

    /// Static headers added to every upstream request.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,

    /// Suppress the `X-MCP: 1` marker header.
    #[serde(default)]
    pub disable_x_mcp: bool,

    /// Session-level description line prepended to every tool description.
    #[serde(default)]
    pub description: Option<String>,

    /// Per-call upstream timeout in seconds (default 30).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}
