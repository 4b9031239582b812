//! Per-session tool registry.
//!
//! Compiled once per session (specs may sit behind the session's own
//! credentials), read-only afterwards, safe for concurrent invocations.
//! Routing is by tool name; unknown names are method-not-found. Arguments
//! are validated against the advertised input schema before any upstream
//! request goes out.

use crate::config::GatewayConfig;
use crate::jsonrpc::JsonRpcError;
use crate::source::{ToolSource, build_source};
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;
use std::sync::Arc;

pub struct ToolRegistry {
    source: Arc<dyn ToolSource>,
    tools: Vec<Tool>,
}

impl ToolRegistry {
    /// Build and start the configured source, caching its tool list.
    ///
    /// # Errors
    ///
    /// Propagates the mapped spec-loading/compilation error; the session
    /// then fails to materialize tools.
    pub async fn compile(
        config: &GatewayConfig,
        session_headers: &[(String, String)],
    ) -> Result<Self, JsonRpcError> {
        let source = build_source(config);
        source.start(session_headers).await?;
        let tools = source.list_tools();
        Ok(Self { source, tools })
    }

    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Route an invocation by tool name.
    ///
    /// # Errors
    ///
    /// Method-not-found for unknown names, invalid-params when the
    /// arguments violate the input schema, otherwise whatever the dispatch
    /// produced.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &Value,
        session_headers: &[(String, String)],
    ) -> Result<CallToolResult, JsonRpcError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| JsonRpcError::method_not_found(format!("unknown tool: {name}")))?;

        validate_arguments(tool, arguments)?;
        self.source.call_tool(name, arguments, session_headers).await
    }
}

/// Validate call arguments against the advertised input schema.
///
/// Violations are reported with typed data: unknown parameters (with
/// near-miss suggestions), missing required parameters, and schema
/// constraint violations.
fn validate_arguments(tool: &Tool, arguments: &Value) -> Result<(), JsonRpcError> {
    let schema = Value::Object((*tool.input_schema).clone());
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    let args = arguments.as_object().cloned().unwrap_or_default();
    let known: Vec<&str> = properties.keys().map(String::as_str).collect();

    let mut violations: Vec<Value> = Vec::new();

    for key in args.keys() {
        if properties.contains_key(key) {
            continue;
        }
        let suggestions = similar_names(key, &known);
        violations.push(serde_json::json!({
            "type": "invalid-parameter",
            "parameter": key,
            "suggestions": suggestions,
        }));
    }

    for name in &required {
        if !args.contains_key(*name) {
            violations.push(serde_json::json!({
                "type": "missing-required-parameter",
                "parameter": name,
            }));
        }
    }

    if let Ok(compiled) = jsonschema::validator_for(&schema) {
        for error in compiled.iter_errors(arguments) {
            // Required violations already reported with a nicer shape.
            if matches!(
                error.kind,
                jsonschema::error::ValidationErrorKind::Required { .. }
            ) {
                continue;
            }
            violations.push(serde_json::json!({
                "type": "constraint-violation",
                "message": error.to_string(),
                "instancePath": error.instance_path.to_string(),
            }));
        }
    }

    if violations.is_empty() {
        return Ok(());
    }

    let message = match violations
        .iter()
        .find(|v| v["type"] == "invalid-parameter")
        .and_then(|v| v["parameter"].as_str())
    {
        Some(param) => {
            let suggestion = violations
                .iter()
                .find(|v| v["parameter"] == param)
                .and_then(|v| v["suggestions"].as_array())
                .and_then(|s| s.first())
                .and_then(Value::as_str);
            match suggestion {
                Some(s) => {
                    format!("Invalid params: unknown parameter '{param}' (did you mean '{s}'?)")
                }
                None => format!("Invalid params: unknown parameter '{param}'"),
            }
        }
        None => format!(
            "Invalid params: validation failed with {} error(s)",
            violations.len()
        ),
    };

    Err(JsonRpcError::with_data(
        rmcp::model::ErrorCode::INVALID_PARAMS,
        message,
        serde_json::json!({ "type": "validation-errors", "violations": violations }),
    ))
}

fn similar_names(unknown: &str, known: &[&str]) -> Vec<String> {
    let mut candidates: Vec<(f64, String)> = known
        .iter()
        .filter_map(|k| {
            let score = strsim::jaro(unknown, k);
            (score > 0.7).then(|| (score, (*k).to_string()))
        })
        .collect();
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorCode;
    use serde_json::json;
    use std::sync::Arc;

    fn pet_tool() -> Tool {
        let schema = json!({
            "type": "object",
            "properties": {
                "petId": { "type": "integer", "description": "Parameter: petId" },
                "verbose": { "type": "boolean" }
            },
            "required": ["petId"]
        });
        Tool::new(
            "getPet",
            "fetch a pet",
            Arc::new(schema.as_object().cloned().unwrap()),
        )
    }

    #[test]
    fn valid_arguments_pass() {
        assert!(validate_arguments(&pet_tool(), &json!({ "petId": 7 })).is_ok());
    }

    #[test]
    fn unknown_parameter_suggests_near_miss() {
        let err = validate_arguments(&pet_tool(), &json!({ "petid": 7 })).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS.0);
        assert!(err.message.contains("did you mean 'petId'"));
    }

    #[test]
    fn missing_required_parameter_is_reported() {
        let err = validate_arguments(&pet_tool(), &json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS.0);
        let data = err.data.unwrap();
        assert!(
            data["violations"]
                .as_array()
                .unwrap()
                .iter()
                .any(|v| v["type"] == "missing-required-parameter")
        );
    }

    #[test]
    fn type_violations_are_reported() {
        let err = validate_arguments(&pet_tool(), &json!({ "petId": "seven" })).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS.0);
        let data = err.data.unwrap();
        assert!(
            data["violations"]
                .as_array()
                .unwrap()
                .iter()
                .any(|v| v["type"] == "constraint-violation")
        );
    }
}
