//! GraphQL tool source runtime.
//!
//! Fetches the introspection result, compiles the query-root fields into
//! tools, and executes reconstructed queries for `tools/call`.

use crate::compiler::{self, GraphqlTool};
use crate::config::GraphqlSourceConfig;
use crate::error::{GraphqlToolsError, Result};
use crate::introspection::INTROSPECTION_QUERY;
use crate::query;
use parking_lot::RwLock;
use reqwest::Client;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::{Map, Value, json};
use specgate_core::auth::AuthPreset;
use specgate_core::headers::{self, StaticHeaders};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GraphQL tool source: one tool per query-root field.
#[derive(Clone)]
pub struct GraphqlToolSource {
    name: String,
    config: GraphqlSourceConfig,
    client: Client,
    tools: Arc<RwLock<Vec<GraphqlTool>>>,
    static_headers: StaticHeaders,
    auth: AuthPreset,
    timeout: Duration,
}

impl GraphqlToolSource {
    #[must_use]
    pub fn new(name: String, config: GraphqlSourceConfig) -> Self {
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
            client: Client::new(),
            tools: Arc::new(RwLock::new(Vec::new())),
            static_headers,
            auth,
            timeout,
        }
    }

    /// Run introspection against the endpoint and compile tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable, the introspection
    /// response does not parse, or the schema is structurally unusable.
    pub async fn start(&self, session_headers: &[(String, String)]) -> Result<()> {
        tracing::info!(source = %self.name, endpoint = %self.config.endpoint, "running introspection");
        let doc = self.fetch_introspection(session_headers).await?;
        let tools = compiler::compile(&self.name, &doc, &self.config)?;
        tracing::info!(
            source = %self.name,
            tools = tools.len(),
            "compiled tools from introspection"
        );
        *self.tools.write() = tools;
        Ok(())
    }

    async fn fetch_introspection(&self, session_headers: &[(String, String)]) -> Result<Value> {
        let response = self
            .post_graphql(&json!({ "query": INTROSPECTION_QUERY }), session_headers)
            .await
            .map_err(|e| match e {
                GraphqlToolsError::Transport(msg) => GraphqlToolsError::SpecNotFound(msg),
                other => other,
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GraphqlToolsError::SpecNotFound(e.to_string()))?;
        if !status.is_success() {
            return Err(GraphqlToolsError::SpecNotFound(format!(
                "introspection POST to '{}' returned {status}",
                self.config.endpoint
            )));
        }
        serde_json::from_str(&text).map_err(|e| GraphqlToolsError::SpecParse {
            location: self.config.endpoint.clone(),
            message: e.to_string(),
        })
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
                // Query operations never write.
                tool.annotations = Some(specgate_core::semantics::annotations_for_method(
                    &reqwest::Method::GET,
                ));
                tool
            })
            .collect()
    }

    /// Execute a tool call: reconstruct the query and POST it upstream.
    ///
    /// HTTP 2xx with GraphQL `errors` is success-with-errors: `data` is
    /// surfaced when present, while `data: null` escalates to an execution
    /// error carrying the error list.
    ///
    /// # Errors
    ///
    /// `UnknownTool` for unknown names, `UpstreamStatus`/`Transport` for
    /// upstream failures, `ExecutionErrors` for `errors` with null data.
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
                .ok_or_else(|| GraphqlToolsError::UnknownTool(name.to_string()))?
        };

        let request_id = new_request_id();

        // Preset values win over user-supplied ones.
        let mut inputs: Map<String, Value> = arguments.as_object().cloned().unwrap_or_default();
        for (key, value) in &tool.plan.preset {
            inputs.insert(key.clone(), value.clone());
        }

        let query_string = query::build_query(&tool.plan, &inputs);
        tracing::info!(
            source = %self.name,
            tool = %name,
            request_id = %request_id,
            query = %query_string,
            "dispatching GraphQL tool call"
        );

        let response = self
            .post_graphql(&json!({ "query": query_string }), session_headers)
            .await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GraphqlToolsError::Transport(e.to_string()))?;

        if !status.is_success() {
            let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!(text));
            return Err(GraphqlToolsError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!(text));
        let result = graphql_result(&body)?;
        tracing::info!(
            source = %self.name,
            tool = %name,
            request_id = %request_id,
            "upstream call completed"
        );
        Ok(result)
    }

    async fn post_graphql(
        &self,
        payload: &Value,
        session_headers: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .timeout(self.timeout)
            .json(payload);

        for (name, value) in self.static_headers.entries() {
            request = request.header(name, value);
        }
        if let Some((name, value)) = self.auth.header() {
            request = request.header(name, value);
        }
        if !self.config.disable_x_mcp {
            request = request.header(headers::X_MCP_HEADER, headers::X_MCP_VALUE);
        }
        for (name, value) in session_headers {
            request = request.header(name, value);
        }

        request
            .send()
            .await
            .map_err(|e| GraphqlToolsError::Transport(e.to_string()))
    }
}

/// Map a 2xx GraphQL response body to a tool result.
fn graphql_result(body: &Value) -> Result<CallToolResult> {
    let errors = body.get("errors").filter(|e| !e.is_null());
    let data = body.get("data").filter(|d| !d.is_null());

    match (data, errors) {
        (None, Some(errors)) => Err(GraphqlToolsError::ExecutionErrors {
            errors: errors.clone(),
        }),
        (Some(data), _) => {
            let text = serde_json::to_string(data).unwrap_or_else(|_| data.to_string());
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        (None, None) => {
            let text = serde_json::to_string(body).unwrap_or_else(|_| body.to_string());
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
    }
}

fn new_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_with_errors_still_surfaces_data() {
        let body = json!({
            "data": { "users": [] },
            "errors": [{ "message": "partial failure" }]
        });
        let result = graphql_result(&body).unwrap();
        assert_eq!(result.is_error, Some(false));
    }

    #[test]
    fn null_data_with_errors_is_an_execution_error() {
        let body = json!({ "data": null, "errors": [{ "message": "boom" }] });
        let err = graphql_result(&body).unwrap_err();
        assert!(matches!(err, GraphqlToolsError::ExecutionErrors { .. }));
    }

    #[test]
    fn plain_data_serializes_as_text() {
        let body = json!({ "data": { "users": [{ "id": 1 }] } });
        let result = graphql_result(&body).unwrap();
        let text = result.content[0].as_text().map(|t| t.text.clone()).unwrap();
        assert_eq!(text, r#"{"users":[{"id":1}]}"#);
    }
}
