//! Gateway configuration.
//!
//! Values layer with precedence CLI > environment > JSON config file. The
//! config file is discovered as `--config` → `CONFIG_FILE` env →
//! `config.json` → `openapi-mcp.json` → `.openapi-mcp.json` in the working
//! directory. Environment names are the SCREAMING_SNAKE form of the config
//! keys; map-valued keys accept JSON-encoded objects in env/CLI position.

use anyhow::Context as _;
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use specgate_graphql_tools::config::GraphqlSourceConfig;
use specgate_openapi_tools::config::ApiSourceConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_FILE_CANDIDATES: [&str; 3] = ["config.json", "openapi-mcp.json", ".openapi-mcp.json"];

#[derive(Parser, Debug, Default)]
#[command(
    name = "specgate-gateway",
    about = "Expose an OpenAPI or GraphQL API as MCP tools"
)]
pub struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Source kind: openapi or graphql.
    #[arg(long = "type")]
    pub source_type: Option<String>,

    /// Transport: stream or sse.
    #[arg(long)]
    pub transport: Option<String>,

    /// Max recursion depth for the GraphQL compiler.
    #[arg(long)]
    pub path_depth: Option<usize>,

    /// OpenAPI spec location (URL or file path).
    #[arg(long)]
    pub spec: Option<String>,

    /// Comma-separated overlay locations.
    #[arg(long)]
    pub overlays: Option<String>,

    /// Upstream base URL (OpenAPI) or GraphQL endpoint.
    #[arg(long)]
    pub target_url: Option<String>,

    /// Comma-separated whitelist patterns.
    #[arg(long)]
    pub whitelist: Option<String>,

    /// Comma-separated blacklist patterns.
    #[arg(long)]
    pub blacklist: Option<String>,

    /// JSON object of parameters injected into every call.
    #[arg(long)]
    pub preset_params: Option<String>,

    /// Upstream API key.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Security scheme whose credential should be used.
    #[arg(long)]
    pub security_scheme_name: Option<String>,

    /// JSON object of credentials keyed by scheme name.
    #[arg(long)]
    pub security_credentials: Option<String>,

    /// JSON object of static upstream headers.
    #[arg(long)]
    pub custom_headers: Option<String>,

    /// Suppress the X-MCP marker header.
    #[arg(long)]
    pub disable_x_mcp: bool,

    /// Session description prepended to every tool description.
    #[arg(long)]
    pub description: Option<String>,

    /// Per-call upstream timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Listen host.
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port.
    #[arg(long)]
    pub port: Option<u16>,
}

/// Raw layered values before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    #[serde(rename = "type")]
    source_type: Option<String>,
    transport: Option<String>,
    path_depth: Option<usize>,
    spec: Option<String>,
    openapi_spec_path: Option<String>,
    overlays: Option<Value>,
    target_url: Option<String>,
    target_api_base_url: Option<String>,
    whitelist: Option<Value>,
    blacklist: Option<Value>,
    preset_params: Option<Value>,
    api_key: Option<String>,
    security_scheme_name: Option<String>,
    security_credentials: Option<Value>,
    custom_headers: Option<Value>,
    disable_x_mcp: Option<Value>,
    description: Option<String>,
    timeout_secs: Option<u64>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stream,
    Sse,
}

#[derive(Debug, Clone)]
pub enum SourceConfig {
    OpenApi(ApiSourceConfig),
    Graphql(GraphqlSourceConfig),
}

/// Validated gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub source: SourceConfig,
}

impl GatewayConfig {
    /// Load and validate configuration from CLI args, process environment
    /// and a discovered config file.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable/invalid config files and for
    /// malformed or incomplete option sets.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(cli, &env)
    }

    fn load_with_env(cli: &Cli, env: &HashMap<String, String>) -> anyhow::Result<Self> {
        let file = discover_config_file(cli.config.as_deref(), env);
        let mut raw = match &file {
            Some(path) => read_config_file(path)?,
            None => RawConfig::default(),
        };
        apply_env(&mut raw, env);
        apply_cli(&mut raw, cli);
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> anyhow::Result<Self> {
        let transport = match raw.transport.as_deref() {
            None | Some("stream") => TransportKind::Stream,
            Some("sse") => TransportKind::Sse,
            Some(other) => anyhow::bail!("unknown transport '{other}' (expected stream or sse)"),
        };

        let source_type = raw.source_type.as_deref().unwrap_or("openapi");
        let whitelist = string_list(raw.whitelist.as_ref(), "whitelist")?;
        let blacklist = string_list(raw.blacklist.as_ref(), "blacklist")?;
        let custom_headers = string_map(raw.custom_headers.as_ref(), "customHeaders")?;
        let security_credentials =
            string_map(raw.security_credentials.as_ref(), "securityCredentials")?;
        let disable_x_mcp = bool_value(raw.disable_x_mcp.as_ref(), "disableXMcp")?;

        let source = match source_type {
            "openapi" => {
                let spec = raw
                    .spec
                    .or(raw.openapi_spec_path)
                    .context("openapi source requires 'spec' (or 'openapiSpecPath')")?;
                SourceConfig::OpenApi(ApiSourceConfig {
                    spec,
                    overlays: string_list(raw.overlays.as_ref(), "overlays")?,
                    base_url: raw.target_url.or(raw.target_api_base_url),
                    whitelist,
                    blacklist,
                    api_key: raw.api_key,
                    security_scheme_name: raw.security_scheme_name,
                    security_credentials,
                    custom_headers,
                    disable_x_mcp,
                    description: raw.description,
                    timeout_secs: raw.timeout_secs,
                })
            }
            "graphql" => {
                let endpoint = raw
                    .target_url
                    .or(raw.target_api_base_url)
                    .context("graphql source requires 'targetUrl'")?;
                let mut config = GraphqlSourceConfig {
                    endpoint,
                    whitelist,
                    blacklist,
                    preset_params: value_map(raw.preset_params.as_ref(), "presetParams")?,
                    api_key: raw.api_key,
                    security_scheme_name: raw.security_scheme_name,
                    security_credentials,
                    custom_headers,
                    disable_x_mcp,
                    description: raw.description,
                    timeout_secs: raw.timeout_secs,
                    ..GraphqlSourceConfig::default()
                };
                if let Some(depth) = raw.path_depth {
                    config.path_depth = depth;
                }
                SourceConfig::Graphql(config)
            }
            other => anyhow::bail!("unknown type '{other}' (expected openapi or graphql)"),
        };

        Ok(Self {
            transport,
            host: raw.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: raw.port.unwrap_or(8080),
            source,
        })
    }

}

fn discover_config_file(
    cli_path: Option<&Path>,
    env: &HashMap<String, String>,
) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.get("CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }
    CONFIG_FILE_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn read_config_file(path: &Path) -> anyhow::Result<RawConfig> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

fn apply_env(raw: &mut RawConfig, env: &HashMap<String, String>) {
    let get = |key: &str| env.get(key).cloned().filter(|v| !v.is_empty());

    if let Some(v) = get("TYPE") {
        raw.source_type = Some(v);
    }
    if let Some(v) = get("TRANSPORT") {
        raw.transport = Some(v);
    }
    if let Some(v) = get("PATH_DEPTH") {
        raw.path_depth = v.parse().ok();
    }
    if let Some(v) = get("SPEC") {
        raw.spec = Some(v);
    }
    if let Some(v) = get("OPENAPI_SPEC_PATH") {
        raw.openapi_spec_path = Some(v);
    }
    if let Some(v) = get("OVERLAYS") {
        raw.overlays = Some(Value::String(v));
    }
    if let Some(v) = get("TARGET_URL") {
        raw.target_url = Some(v);
    }
    if let Some(v) = get("TARGET_API_BASE_URL") {
        raw.target_api_base_url = Some(v);
    }
    if let Some(v) = get("WHITELIST") {
        raw.whitelist = Some(Value::String(v));
    }
    if let Some(v) = get("BLACKLIST") {
        raw.blacklist = Some(Value::String(v));
    }
    if let Some(v) = get("PRESET_PARAMS") {
        raw.preset_params = Some(Value::String(v));
    }
    if let Some(v) = get("API_KEY") {
        raw.api_key = Some(v);
    }
    if let Some(v) = get("SECURITY_SCHEME_NAME") {
        raw.security_scheme_name = Some(v);
    }
    if let Some(v) = get("SECURITY_CREDENTIALS") {
        raw.security_credentials = Some(Value::String(v));
    }
    if let Some(v) = get("CUSTOM_HEADERS") {
        raw.custom_headers = Some(Value::String(v));
    }
    if let Some(v) = get("DISABLE_X_MCP") {
        raw.disable_x_mcp = Some(Value::String(v));
    }
    if let Some(v) = get("DESCRIPTION") {
        raw.description = Some(v);
    }
    if let Some(v) = get("TIMEOUT_SECS") {
        raw.timeout_secs = v.parse().ok();
    }
    if let Some(v) = get("HOST") {
        raw.host = Some(v);
    }
    if let Some(v) = get("PORT") {
        raw.port = v.parse().ok();
    }
}

fn apply_cli(raw: &mut RawConfig, cli: &Cli) {
    if let Some(v) = &cli.source_type {
        raw.source_type = Some(v.clone());
    }
    if let Some(v) = &cli.transport {
        raw.transport = Some(v.clone());
    }
    if let Some(v) = cli.path_depth {
        raw.path_depth = Some(v);
    }
    if let Some(v) = &cli.spec {
        raw.spec = Some(v.clone());
    }
    if let Some(v) = &cli.overlays {
        raw.overlays = Some(Value::String(v.clone()));
    }
    if let Some(v) = &cli.target_url {
        raw.target_url = Some(v.clone());
    }
    if let Some(v) = &cli.whitelist {
        raw.whitelist = Some(Value::String(v.clone()));
    }
    if let Some(v) = &cli.blacklist {
        raw.blacklist = Some(Value::String(v.clone()));
    }
    if let Some(v) = &cli.preset_params {
        raw.preset_params = Some(Value::String(v.clone()));
    }
    if let Some(v) = &cli.api_key {
        raw.api_key = Some(v.clone());
    }
    if let Some(v) = &cli.security_scheme_name {
        raw.security_scheme_name = Some(v.clone());
    }
    if let Some(v) = &cli.security_credentials {
        raw.security_credentials = Some(Value::String(v.clone()));
    }
    if let Some(v) = &cli.custom_headers {
        raw.custom_headers = Some(Value::String(v.clone()));
    }
    if cli.disable_x_mcp {
        raw.disable_x_mcp = Some(Value::Bool(true));
    }
    if let Some(v) = &cli.description {
        raw.description = Some(v.clone());
    }
    if let Some(v) = cli.timeout_secs {
        raw.timeout_secs = Some(v);
    }
    if let Some(v) = &cli.host {
        raw.host = Some(v.clone());
    }
    if let Some(v) = cli.port {
        raw.port = Some(v);
    }
}

/// Comma-separated string or JSON array of strings.
fn string_list(value: Option<&Value>, key: &str) -> anyhow::Result<Vec<String>> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .with_context(|| format!("'{key}' entries must be strings"))
            })
            .collect(),
        Some(other) => anyhow::bail!("'{key}' must be a string or array, got {other}"),
    }
}

/// JSON object (inline or encoded as a string) with string values.
fn string_map(value: Option<&Value>, key: &str) -> anyhow::Result<HashMap<String, String>> {
    Ok(value_map(value, key)?
        .into_iter()
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, rendered)
        })
        .collect())
}

/// JSON object (inline or encoded as a string) with arbitrary values.
fn value_map(value: Option<&Value>, key: &str) -> anyhow::Result<HashMap<String, Value>> {
    let object = match value {
        None => return Ok(HashMap::new()),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(HashMap::new()),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .with_context(|| format!("'{key}' must be a JSON object"))?,
        Some(other) => anyhow::bail!("'{key}' must be a JSON object, got {other}"),
    };
    Ok(object.into_iter().collect())
}

fn bool_value(value: Option<&Value>, key: &str) -> anyhow::Result<bool> {
    match value {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => anyhow::bail!("'{key}' must be a boolean, got '{other}'"),
        },
        Some(other) => anyhow::bail!("'{key}' must be a boolean, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn file_values_load_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "type": "openapi",
                "spec": "petstore.yaml",
                "targetUrl": "https://api.example.com",
                "blacklist": "delete*,admin*",
                "customHeaders": { "X-Tenant": "acme" }
            })
            .to_string(),
        )
        .unwrap();

        let cli = Cli {
            config: Some(path),
            ..Cli::default()
        };
        let config = GatewayConfig::load_with_env(&cli, &HashMap::new()).unwrap();
        assert_eq!(config.transport, TransportKind::Stream);
        let SourceConfig::OpenApi(api) = &config.source else {
            panic!("expected openapi source");
        };
        assert_eq!(api.spec, "petstore.yaml");
        assert_eq!(api.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(api.blacklist, vec!["delete*", "admin*"]);
        assert_eq!(api.custom_headers.get("X-Tenant").unwrap(), "acme");
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.json");
        std::fs::write(
            &path,
            serde_json::json!({ "type": "openapi", "spec": "file.yaml", "port": 1000 }).to_string(),
        )
        .unwrap();

        let cli = Cli {
            config: Some(path.clone()),
            ..Cli::default()
        };
        let env = env(&[("SPEC", "env.yaml"), ("PORT", "2000")]);
        let config = GatewayConfig::load_with_env(&cli, &env).unwrap();
        let SourceConfig::OpenApi(api) = &config.source else {
            panic!("expected openapi source");
        };
        assert_eq!(api.spec, "env.yaml");
        assert_eq!(config.port, 2000);

        let cli = Cli {
            config: Some(path),
            spec: Some("cli.yaml".to_string()),
            port: Some(3000),
            ..Cli::default()
        };
        let config = GatewayConfig::load_with_env(&cli, &env).unwrap();
        let SourceConfig::OpenApi(api) = &config.source else {
            panic!("expected openapi source");
        };
        assert_eq!(api.spec, "cli.yaml");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn graphql_source_parses_preset_params() {
        let cli = Cli {
            source_type: Some("graphql".to_string()),
            target_url: Some("https://gql.example.com/graphql".to_string()),
            preset_params: Some(r#"{"tenantId": "t1"}"#.to_string()),
            path_depth: Some(4),
            transport: Some("sse".to_string()),
            ..Cli::default()
        };
        let config = GatewayConfig::load_with_env(&cli, &HashMap::new()).unwrap();
        assert_eq!(config.transport, TransportKind::Sse);
        let SourceConfig::Graphql(gql) = &config.source else {
            panic!("expected graphql source");
        };
        assert_eq!(gql.endpoint, "https://gql.example.com/graphql");
        assert_eq!(gql.path_depth, 4);
        assert_eq!(
            gql.preset_params.get("tenantId"),
            Some(&Value::String("t1".to_string()))
        );
    }

    #[test]
    fn missing_required_fields_fail_validation() {
        let cli = Cli::default();
        assert!(GatewayConfig::load_with_env(&cli, &HashMap::new()).is_err());

        let cli = Cli {
            source_type: Some("graphql".to_string()),
            ..Cli::default()
        };
        assert!(GatewayConfig::load_with_env(&cli, &HashMap::new()).is_err());

        let cli = Cli {
            source_type: Some("ftp".to_string()),
            spec: Some("x".to_string()),
            ..Cli::default()
        };
        assert!(GatewayConfig::load_with_env(&cli, &HashMap::new()).is_err());
    }

    #[test]
    fn config_file_env_var_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pointed.json");
        std::fs::write(
            &path,
            serde_json::json!({ "type": "openapi", "spec": "via-env.yaml" }).to_string(),
        )
        .unwrap();

        let env = env(&[("CONFIG_FILE", path.to_str().unwrap())]);
        let config = GatewayConfig::load_with_env(&Cli::default(), &env).unwrap();
        let SourceConfig::OpenApi(api) = &config.source else {
            panic!("expected openapi source");
        };
        assert_eq!(api.spec, "via-env.yaml");
    }

    #[test]
    fn disable_x_mcp_accepts_bool_and_string_forms() {
        let cli = Cli {
            source_type: Some("openapi".to_string()),
            spec: Some("s.yaml".to_string()),
            disable_x_mcp: true,
            ..Cli::default()
        };
        let config = GatewayConfig::load_with_env(&cli, &HashMap::new()).unwrap();
        let SourceConfig::OpenApi(api) = &config.source else {
            panic!("expected openapi source");
        };
        assert!(api.disable_x_mcp);

        let env = env(&[("DISABLE_X_MCP", "true")]);
        let cli = Cli {
            source_type: Some("openapi".to_string()),
            spec: Some("s.yaml".to_string()),
            ..Cli::default()
        };
        let config = GatewayConfig::load_with_env(&cli, &env).unwrap();
        let SourceConfig::OpenApi(api) = &config.source else {
            panic!("expected openapi source");
        };
        assert!(api.disable_x_mcp);
    }
}
