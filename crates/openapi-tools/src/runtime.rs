//! OpenAPI tool source runtime.
//!
//! Owns the loaded spec and the compiled tools for one session, and executes
//! the upstream HTTP request for `tools/call`.

use crate::compiler::{self, ArrayStyle, BodyPlan, CompiledRestTool, ParamLocation};
use crate::config::ApiSourceConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::loader::SpecLoader;
use parking_lot::RwLock;
use reqwest::{Client, Method};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::{Value, json};
use specgate_core::auth::AuthPreset;
use specgate_core::headers::{self, StaticHeaders};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAPI tool source: compiles a spec into tools and dispatches calls.
#[derive(Clone)]
pub struct OpenApiToolSource {
    name: String,
    config: ApiSourceConfig,
    client: Client,
    tools: Arc<RwLock<Vec<CompiledRestTool>>>,
    base_url: Arc<RwLock<Option<String>>>,
    static_headers: StaticHeaders,
    auth: AuthPreset,
    timeout: Duration,
}

/// A fully assembled upstream request, ready for execution.
#[derive(Debug)]
struct AssembledRequest {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl OpenApiToolSource {
    #[must_use]
    pub fn new(name: String, config: ApiSourceConfig) -> Self {
        // Redirects are not followed: 3xx responses count as tool success.
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| Client::new());

        let static_headers = StaticHeaders::from_config(&config.custom_headers, std::env::vars());
        let auth = AuthPreset::resolve(
            config.api_key.as_deref(),
            config.security_scheme_name.as_deref(),
            &config.security_credentials,
        );
        let timeout = config
            .timeout_secs
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        Self {
            name,
            config,
            client,
            tools: Arc::new(RwLock::new(Vec::new())),
            base_url: Arc::new(RwLock::new(None)),
            static_headers,
            auth,
            timeout,
        }
    }

    /// Load the spec (with overlays), compile tools and make the source
    /// ready. `session_headers` are forwarded on the spec fetch: specs may
    /// sit behind the same credentials as the API itself.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing or compiling the spec fails, or
    /// if no base URL is configured and none is declared in the spec.
    pub async fn start(&self, session_headers: &[(String, String)]) -> Result<()> {
        let loader = SpecLoader::new(self.client.clone());
        let doc = loader
            .load_openapi(&self.config.spec, &self.config.overlays, session_headers)
            .await?;

        let base_url = self
            .config
            .base_url
            .clone()
            .or_else(|| spec_server_url(&doc));
        let Some(base_url) = base_url else {
            return Err(OpenApiToolsError::Config(
                "no base URL configured and none found in spec".to_string(),
            ));
        };
        let base_url = self.resolve_base_url(&base_url)?;

        let tools = compiler::compile(&self.name, &doc, &self.config)?;
        tracing::info!(
            source = %self.name,
            tools = tools.len(),
            "compiled tools from OpenAPI spec"
        );

        *self.base_url.write() = Some(base_url);
        *self.tools.write() = tools;
        Ok(())
    }

    /// The MCP tools exposed by this source.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        let tools = self.tools.read();
        tools
            .iter()
            .map(|t| {
                let schema = t
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_else(JsonObject::new);
                let mut tool = Tool::new(t.name.clone(), t.description.clone(), Arc::new(schema));
                tool.annotations = Some(specgate_core::semantics::annotations_for_method(
                    &t.plan.method,
                ));
                tool
            })
            .collect()
    }

    /// Execute a tool call against the upstream API.
    ///
    /// # Errors
    ///
    /// `UnknownTool` for unknown names, `MissingParam` for absent required
    /// arguments, `UpstreamStatus` for non-success upstream responses and
    /// `Transport` when no response was received at all.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        session_headers: &[(String, String)],
    ) -> Result<CallToolResult> {
        let tool = {
            let tools = self.tools.read();
            tools
                .iter()
                .find(|t| t.name == name)
                .cloned()
                .ok_or_else(|| OpenApiToolsError::UnknownTool(name.to_string()))?
        };

        let request_id = new_request_id();
        tracing::info!(
            source = %self.name,
            tool = %name,
            request_id = %request_id,
            "dispatching REST tool call"
        );

        let assembled = self.assemble_request(&tool, arguments, session_headers)?;
        let response = self.execute(assembled).await?;

        tracing::info!(
            source = %self.name,
            tool = %name,
            request_id = %request_id,
            "upstream call completed"
        );
        Ok(response)
    }

    fn assemble_request(
        &self,
        tool: &CompiledRestTool,
        arguments: &Value,
        session_headers: &[(String, String)],
    ) -> Result<AssembledRequest> {
        let base_url = self
            .base_url
            .read()
            .clone()
            .ok_or_else(|| OpenApiToolsError::Runtime("source not started".to_string()))?;

        let mut path = tool.plan.path_template.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers: Vec<(String, String)> = self
            .static_headers
            .entries()
            .iter()
            .cloned()
            .collect();
        let mut cookies: Vec<String> = Vec::new();

        if let Some((name, value)) = self.auth.header() {
            headers.push((name.to_string(), value.to_string()));
        }
        if !self.config.disable_x_mcp {
            headers.push((headers::X_MCP_HEADER.to_string(), headers::X_MCP_VALUE.to_string()));
        }

        for param in &tool.plan.parameters {
            let value = arguments.get(&param.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                if param.required {
                    return Err(OpenApiToolsError::MissingParam(param.name.clone()));
                }
                continue;
            };

            match param.location {
                ParamLocation::Path => {
                    let encoded = encode_component(&value_to_string(value));
                    path = path.replace(&format!("{{{}}}", param.name), &encoded);
                }
                ParamLocation::Query => {
                    query.extend(query_pairs(&param.name, value, param.style));
                }
                ParamLocation::Header => {
                    headers.push((param.name.clone(), value_to_string(value)));
                }
                ParamLocation::Cookie => {
                    cookies.push(format!("{}={}", param.name, value_to_string(value)));
                }
            }
        }

        if !cookies.is_empty() {
            headers.push(("Cookie".to_string(), cookies.join("; ")));
        }

        // Captured session headers go on last: they propagate verbatim.
        headers.extend(session_headers.iter().cloned());

        let body = assemble_body(tool.plan.body.as_ref(), arguments)?;
        let url = build_url(&base_url, &path, &query)?;

        Ok(AssembledRequest {
            method: tool.plan.method.clone(),
            url,
            headers,
            body,
        })
    }

    async fn execute(&self, assembled: AssembledRequest) -> Result<CallToolResult> {
        let mut request = self
            .client
            .request(assembled.method, assembled.url)
            .timeout(self.timeout);
        for (name, value) in &assembled.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &assembled.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpenApiToolsError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OpenApiToolsError::Transport(e.to_string()))?;

        if status.is_success() || status.is_redirection() {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else {
            let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!(text));
            Err(OpenApiToolsError::UpstreamStatus {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn resolve_base_url(&self, base_url: &str) -> Result<String> {
        if base_url.starts_with("http://") || base_url.starts_with("https://") {
            return Ok(base_url.trim_end_matches('/').to_string());
        }

        // OpenAPI allows relative server URLs ("/api/v3"); when the spec was
        // fetched from a URL, resolve against it.
        if self.config.spec.starts_with("http://") || self.config.spec.starts_with("https://") {
            let spec_url = Url::parse(&self.config.spec).map_err(|e| {
                OpenApiToolsError::Config(format!("invalid spec URL '{}': {e}", self.config.spec))
            })?;
            let resolved = spec_url.join(base_url).map_err(|e| {
                OpenApiToolsError::Config(format!("invalid baseUrl '{base_url}': {e}"))
            })?;
            return Ok(resolved.to_string().trim_end_matches('/').to_string());
        }

        Err(OpenApiToolsError::Config(format!(
            "baseUrl '{base_url}' must be an absolute http(s) URL"
        )))
    }
}

fn spec_server_url(doc: &Value) -> Option<String> {
    doc.get("servers")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

fn assemble_body(plan: Option<&BodyPlan>, arguments: &Value) -> Result<Option<Value>> {
    let Some(plan) = plan else {
        return Ok(None);
    };

    // Preferred form: the caller passed the whole body under `requestBody`.
    if let Some(body) = arguments.get("requestBody").filter(|v| !v.is_null()) {
        return Ok(Some(body.clone()));
    }

    // Fallback: collect the hoisted body properties from the top level.
    let mut fields = serde_json::Map::new();
    for name in &plan.properties {
        if let Some(value) = arguments.get(name).filter(|v| !v.is_null()) {
            fields.insert(name.clone(), value.clone());
        }
    }
    if !fields.is_empty() {
        return Ok(Some(Value::Object(fields)));
    }

    if plan.required {
        return Err(OpenApiToolsError::MissingParam("requestBody".to_string()));
    }
    Ok(None)
}

fn query_pairs(name: &str, value: &Value, style: ArrayStyle) -> Vec<(String, String)> {
    match value {
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(value_to_string).collect();
            match style {
                ArrayStyle::Repeated => rendered
                    .into_iter()
                    .map(|v| (name.to_string(), v))
                    .collect(),
                ArrayStyle::SpaceDelimited => vec![(name.to_string(), rendered.join(" "))],
                ArrayStyle::PipeDelimited => vec![(name.to_string(), rendered.join("|"))],
            }
        }
        Value::Object(_) => vec![(
            name.to_string(),
            serde_json::to_string(value).unwrap_or_default(),
        )],
        _ => vec![(name.to_string(), value_to_string(value))],
    }
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&joined)
        .map_err(|e| OpenApiToolsError::Runtime(format!("invalid URL '{joined}': {e}")))?;

    if !query.is_empty() {
        let mut rendered = String::new();
        for (i, (key, value)) in query.iter().enumerate() {
            if i > 0 {
                rendered.push('&');
            }
            rendered.push_str(&encode_component(key));
            rendered.push('=');
            rendered.push_str(&encode_component(value));
        }
        url.set_query(Some(&rendered));
    }

    Ok(url)
}

/// Convert a JSON value to its string form for URL/header placement.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Percent-encode everything except RFC 3986 unreserved characters.
fn encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        let unreserved =
            matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~');
        if unreserved {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn new_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
