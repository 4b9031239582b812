use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn default_path_depth() -> usize {
    2
}

/// Configuration for a GraphQL-backed tool source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlSourceConfig {
    /// GraphQL endpoint URL (introspection and query execution).
    pub endpoint: String,

    /// Max recursion depth for selection sets and filter flattening.
    #[serde(default = "default_path_depth")]
    pub path_depth: usize,

    /// Retain only matching root fields (glob), plus `tool.param` entries.
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Remove matching root fields / params; consulted only when the
    /// whitelist is empty.
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Values injected into every call; matching parameters are hidden from
    /// the tool's input schema.
    #[serde(default)]
    pub preset_params: HashMap<String, Value>,

    /// Bare upstream API key.
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

impl Default for GraphqlSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            path_depth: default_path_depth(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            preset_params: HashMap::new(),
            api_key: None,
            security_scheme_name: None,
            security_credentials: HashMap::new(),
            custom_headers: HashMap::new(),
            disable_x_mcp: false,
            description: None,
            timeout_secs: None,
        }
    }
}
