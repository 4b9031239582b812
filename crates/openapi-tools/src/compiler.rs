//! OpenAPI operation → MCP tool compilation.
//!
//! One tool per retained operation. The tool carries a flat input schema
//! (parameters at top level plus a synthetic `requestBody` object) and a
//! [`RestPlan`] describing how to rebuild the upstream request at dispatch
//! time. No `$ref` survives into a descriptor: schemas collapse to protocol
//! primitives (string/number/integer/boolean) or permissive objects/arrays.

use crate::config::ApiSourceConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::RefResolver;
use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterSchemaOrContent, PathItem, QueryStyle, ReferenceOr,
    Schema, SchemaKind, Type,
};
use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use specgate_core::filter::OperationFilter;
use specgate_core::naming::reserve_unique_tool_name;
use std::collections::HashSet;

/// A tool compiled from one OpenAPI operation.
#[derive(Debug, Clone)]
pub struct CompiledRestTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub plan: RestPlan,
}

/// Request-build plan for a REST tool.
#[derive(Debug, Clone)]
pub struct RestPlan {
    pub method: Method,
    pub path_template: String,
    pub parameters: Vec<PlanParameter>,
    pub body: Option<BodyPlan>,
}

#[derive(Debug, Clone)]
pub struct BodyPlan {
    pub required: bool,
    /// Property names hoisted from an object body schema; empty when the
    /// body is not an object (the raw `requestBody` input is used then).
    pub properties: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PlanParameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub style: ArrayStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// Serialization of array-valued query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayStyle {
    /// One `key=value` pair per element.
    #[default]
    Repeated,
    SpaceDelimited,
    PipeDelimited,
}

/// `x-mcp` extension: per-operation tool name/description override.
#[derive(Debug, Clone, Default, Deserialize)]
struct XMcpOverride {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Compile every retained operation of the document into a tool.
///
/// # Errors
///
/// Returns `SpecInvalid` when the document is not a usable OpenAPI spec.
/// Individually unmappable operations are logged and skipped.
pub fn compile(source_name: &str, doc: &Value, config: &ApiSourceConfig) -> Result<Vec<CompiledRestTool>> {
    let spec: OpenAPI = serde_json::from_value(doc.clone())
        .map_err(|e| OpenApiToolsError::SpecInvalid(format!("not an OpenAPI document: {e}")))?;
    let resolver = RefResolver::new(doc);
    let filter = OperationFilter::new(&config.whitelist, &config.blacklist);
    let session_description = config.description.clone().unwrap_or_default();

    let mut tools = Vec::new();
    let mut tool_names: HashSet<String> = HashSet::new();

    for (path, item_ref) in &spec.paths.paths {
        let path_item = match resolver.resolve(item_ref) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(source = %source_name, path = %path, error = %e, "skipping path");
                continue;
            }
        };

        for (method, operation) in operations_of(&path_item) {
            let method_name = method.as_str();
            if !filter.retains_operation(operation.operation_id.as_deref(), method_name, path) {
                continue;
            }

            match compile_operation(CompileInput {
                resolver: &resolver,
                path,
                path_item: &path_item,
                method: method.clone(),
                operation,
                session_description: &session_description,
                tool_names: &mut tool_names,
            }) {
                Ok(tool) => tools.push(tool),
                Err(e) => {
                    tracing::warn!(
                        source = %source_name,
                        method = %method_name,
                        path = %path,
                        error = %e,
                        "skipping unmappable operation"
                    );
                }
            }
        }
    }

    Ok(tools)
}

fn operations_of(item: &PathItem) -> Vec<(Method, &Operation)> {
    let slots = [
        (Method::GET, &item.get),
        (Method::POST, &item.post),
        (Method::PUT, &item.put),
        (Method::PATCH, &item.patch),
        (Method::DELETE, &item.delete),
        (Method::HEAD, &item.head),
        (Method::OPTIONS, &item.options),
    ];
    slots
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
        .collect()
}

struct CompileInput<'a> {
    resolver: &'a RefResolver<'a>,
    path: &'a str,
    path_item: &'a PathItem,
    method: Method,
    operation: &'a Operation,
    session_description: &'a str,
    tool_names: &'a mut HashSet<String>,
}

fn compile_operation(input: CompileInput<'_>) -> Result<CompiledRestTool> {
    let CompileInput {
        resolver,
        path,
        path_item,
        method,
        operation,
        session_description,
        tool_names,
    } = input;

    let x_mcp = x_mcp_override(operation, path_item);

    let base_name = x_mcp
        .name
        .clone()
        .or_else(|| operation.operation_id.clone())
        .unwrap_or_else(|| canonical_name(method.as_str(), path));
    let name = reserve_unique_tool_name(tool_names, &base_name);

    let resolved_description = x_mcp
        .description
        .clone()
        .or_else(|| operation.description.clone())
        .or_else(|| operation.summary.clone())
        .or_else(|| path_item.summary.clone())
        .unwrap_or_default();
    let description =
        format!("MCP description: {session_description}. Tool description: {resolved_description}");

    let merged_params = merge_parameters(resolver, &path_item.parameters, &operation.parameters)?;

    let mut properties = serde_json::Map::new();
    let mut required: Vec<String> = Vec::new();
    let mut plan_params: Vec<PlanParameter> = Vec::new();

    for param in &merged_params {
        let (data, location, style) = match param {
            Parameter::Path { parameter_data, .. } => {
                (parameter_data, ParamLocation::Path, ArrayStyle::Repeated)
            }
            Parameter::Query {
                parameter_data,
                style,
                ..
            } => (parameter_data, ParamLocation::Query, array_style(style)),
            Parameter::Header { parameter_data, .. } => {
                (parameter_data, ParamLocation::Header, ArrayStyle::Repeated)
            }
            Parameter::Cookie { parameter_data, .. } => {
                (parameter_data, ParamLocation::Cookie, ArrayStyle::Repeated)
            }
        };

        let is_required = location == ParamLocation::Path || data.required;
        let mut prop = parameter_property(resolver, &data.format)?;
        set_description(
            &mut prop,
            data.description
                .clone()
                .unwrap_or_else(|| format!("Parameter: {}", data.name)),
        );

        if properties.contains_key(&data.name) {
            // Later definitions (operation level) already won during the
            // merge; a genuine duplicate here is a spec defect.
            continue;
        }
        properties.insert(data.name.clone(), prop);
        if is_required {
            required.push(data.name.clone());
        }
        plan_params.push(PlanParameter {
            name: data.name.clone(),
            location,
            required: is_required,
            style,
        });
    }

    let body = compile_request_body(resolver, operation, &mut properties, &mut required)?;

    let mut input_schema = json!({
        "type": "object",
        "properties": Value::Object(properties),
    });
    if !required.is_empty() {
        input_schema["required"] = json!(required);
    }

    Ok(CompiledRestTool {
        name,
        description,
        input_schema,
        plan: RestPlan {
            method,
            path_template: path.to_string(),
            parameters: plan_params,
            body,
        },
    })
}

fn x_mcp_override(operation: &Operation, path_item: &PathItem) -> XMcpOverride {
    let raw = operation
        .extensions
        .get("x-mcp")
        .or_else(|| path_item.extensions.get("x-mcp"));
    raw.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn array_style(style: &QueryStyle) -> ArrayStyle {
    match style {
        QueryStyle::SpaceDelimited => ArrayStyle::SpaceDelimited,
        QueryStyle::PipeDelimited => ArrayStyle::PipeDelimited,
        QueryStyle::Form | QueryStyle::DeepObject => ArrayStyle::Repeated,
    }
}

/// Merge path-item and operation parameters; operation-level wins on
/// (location, name) conflicts.
fn merge_parameters(
    resolver: &RefResolver<'_>,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<Parameter>> {
    fn key_of(p: &Parameter) -> (&'static str, String) {
        match p {
            Parameter::Path { parameter_data, .. } => ("path", parameter_data.name.clone()),
            Parameter::Query { parameter_data, .. } => ("query", parameter_data.name.clone()),
            Parameter::Header { parameter_data, .. } => ("header", parameter_data.name.clone()),
            Parameter::Cookie { parameter_data, .. } => ("cookie", parameter_data.name.clone()),
        }
    }

    let mut merged: Vec<Parameter> = Vec::new();
    for group in [path_item_params, operation_params] {
        for param_ref in group {
            let param = resolver.resolve(param_ref)?;
            let key = key_of(&param);
            if let Some(existing) = merged.iter_mut().find(|p| key_of(p) == key) {
                *existing = param;
            } else {
                merged.push(param);
            }
        }
    }
    Ok(merged)
}

fn compile_request_body(
    resolver: &RefResolver<'_>,
    operation: &Operation,
    properties: &mut serde_json::Map<String, Value>,
    required: &mut Vec<String>,
) -> Result<Option<BodyPlan>> {
    let Some(body_ref) = &operation.request_body else {
        return Ok(None);
    };
    let body = resolver.resolve(body_ref)?;
    let Some(schema_ref) = body
        .content
        .get("application/json")
        .and_then(|media| media.schema.as_ref())
    else {
        return Ok(None);
    };
    let schema = resolver.resolve(schema_ref)?;

    let (body_schema, hoisted) = match &schema.schema_kind {
        SchemaKind::Type(Type::Object(obj)) => {
            let mut body_props = serde_json::Map::new();
            let mut names = Vec::new();
            for (prop_name, prop_ref) in &obj.properties {
                let prop_schema = resolver.resolve(&prop_ref.clone().unbox())?;
                let mut prop = schema_property(&prop_schema);
                set_description(
                    &mut prop,
                    prop_schema
                        .schema_data
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("Parameter: {prop_name}")),
                );
                body_props.insert(prop_name.clone(), prop);
                names.push(prop_name.clone());
            }
            let mut body_schema = json!({
                "type": "object",
                "properties": Value::Object(body_props),
                "description": "Request body",
            });
            if !obj.required.is_empty() {
                body_schema["required"] = json!(obj.required);
            }
            (body_schema, names)
        }
        _ => {
            let mut body_schema = schema_property(&schema);
            set_description(&mut body_schema, "Request body".to_string());
            (body_schema, Vec::new())
        }
    };

    properties.insert("requestBody".to_string(), body_schema);
    if body.required {
        required.push("requestBody".to_string());
    }

    Ok(Some(BodyPlan {
        required: body.required,
        properties: hoisted,
    }))
}

/// Collapse a parameter schema (or content fallback) to a protocol primitive.
fn parameter_property(
    resolver: &RefResolver<'_>,
    format: &ParameterSchemaOrContent,
) -> Result<Value> {
    match format {
        ParameterSchemaOrContent::Schema(schema_ref) => {
            let schema = resolver.resolve(schema_ref)?;
            Ok(schema_property(&schema))
        }
        ParameterSchemaOrContent::Content(_) => Ok(json!({ "type": "string" })),
    }
}

/// Protocol-primitive rendering of a schema: integer/number/boolean keep
/// their kind, objects become permissive, arrays take any items, everything
/// else (including composites) is a string.
fn schema_property(schema: &Schema) -> Value {
    match &schema.schema_kind {
        SchemaKind::Type(Type::Integer(_)) => json!({ "type": "integer" }),
        SchemaKind::Type(Type::Number(_)) => json!({ "type": "number" }),
        SchemaKind::Type(Type::Boolean(_)) => json!({ "type": "boolean" }),
        SchemaKind::Type(Type::Object(_)) => {
            json!({ "type": "object", "additionalProperties": true })
        }
        SchemaKind::Type(Type::Array(_)) => json!({ "type": "array", "items": {} }),
        SchemaKind::Type(Type::String(s)) => {
            let mut prop = json!({ "type": "string" });
            let values: Vec<&String> = s.enumeration.iter().flatten().collect();
            if !values.is_empty() {
                prop["enum"] = json!(values);
            }
            prop
        }
        _ => json!({ "type": "string" }),
    }
}

fn set_description(prop: &mut Value, description: String) {
    if let Some(obj) = prop.as_object_mut() {
        obj.insert("description".to_string(), Value::String(description));
    }
}

/// Synthesized tool name for operations without `operationId`:
/// `METHOD_path_with_slashes_replaced_by_underscores`.
fn canonical_name(method: &str, path: &str) -> String {
    let re = Regex::new(r"[^A-Za-z0-9]+").expect("static regex");
    let flattened = re.replace_all(path, "_");
    let flattened = flattened.trim_matches('_');
    format!("{}_{}", method.to_ascii_uppercase(), flattened)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn petstore() -> Value {
        parse(
            r#"
openapi: "3.0.0"
info: { title: pets, version: "1" }
paths:
  /pets:
    get:
      operationId: listPets
      summary: List all pets
      responses: { "200": { description: ok } }
  /pets/{id}:
    get:
      operationId: getPet
      description: Fetch one pet
      parameters:
        - name: id
          in: path
          required: true
          schema: { type: integer }
      responses: { "200": { description: ok } }
    delete:
      operationId: deletePet
      parameters:
        - name: id
          in: path
          required: true
          schema: { type: integer }
      responses: { "204": { description: gone } }
"#,
        )
    }

    #[test]
    fn compiles_one_tool_per_operation() {
        let tools = compile("pets", &petstore(), &ApiSourceConfig::default()).unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["listPets", "getPet", "deletePet"]);
    }

    #[test]
    fn blacklist_glob_removes_operations() {
        let config = ApiSourceConfig {
            blacklist: vec!["delete*".to_string()],
            ..ApiSourceConfig::default()
        };
        let tools = compile("pets", &petstore(), &config).unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["listPets", "getPet"]);
    }

    #[test]
    fn whitelist_restricts_by_method_path() {
        let config = ApiSourceConfig {
            whitelist: vec!["GET:/pets/**".to_string()],
            blacklist: vec!["getPet".to_string()],
            ..ApiSourceConfig::default()
        };
        let tools = compile("pets", &petstore(), &config).unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        // `/pets/**` matches the templated path but not `/pets` itself, and
        // the whitelist dominates: the blacklist is not consulted.
        assert_eq!(names, vec!["getPet"]);
    }

    #[test]
    fn x_mcp_name_wins_over_operation_id() {
        let mut doc = petstore();
        doc["paths"]["/pets"]["get"]["x-mcp"] = serde_json::json!({ "name": "pets_list" });
        let tools = compile("pets", &doc, &ApiSourceConfig::default()).unwrap();
        assert!(tools.iter().any(|t| t.name == "pets_list"));
        assert!(tools.iter().all(|t| t.name != "listPets"));
    }

    #[test]
    fn description_prefix_is_stable_across_compiles() {
        let config = ApiSourceConfig {
            description: Some("petstore session".to_string()),
            ..ApiSourceConfig::default()
        };
        let first = compile("pets", &petstore(), &config).unwrap();
        let second = compile("pets", &petstore(), &config).unwrap();
        let get = |tools: &[CompiledRestTool]| {
            tools
                .iter()
                .find(|t| t.name == "getPet")
                .unwrap()
                .description
                .clone()
        };
        assert_eq!(get(&first), get(&second));
        assert_eq!(
            get(&first),
            "MCP description: petstore session. Tool description: Fetch one pet"
        );
    }

    #[test]
    fn missing_operation_id_synthesizes_a_name() {
        let doc = parse(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /users/{id}/repos:
    get:
      responses: { "200": { description: ok } }
"#,
        );
        let tools = compile("t", &doc, &ApiSourceConfig::default()).unwrap();
        assert_eq!(tools[0].name, "GET_users_id_repos");
    }

    #[test]
    fn colliding_names_get_numeric_suffixes() {
        let doc = parse(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /a:
    get:
      operationId: op
      responses: { "200": { description: ok } }
    post:
      operationId: op
      responses: { "200": { description: ok } }
  /b:
    get:
      operationId: op
      responses: { "200": { description: ok } }
"#,
        );
        let tools = compile("t", &doc, &ApiSourceConfig::default()).unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["op", "op_2", "op_3"]);
        let unique: HashSet<&&str> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn request_body_properties_are_hoisted_under_request_body() {
        let doc = parse(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
components:
  schemas:
    NewPet:
      type: object
      required: [name]
      properties:
        name: { type: string }
        age: { type: integer }
        tags: { type: array, items: { type: string } }
paths:
  /pets:
    post:
      operationId: addPet
      requestBody:
        required: true
        content:
          application/json:
            schema: { $ref: '#/components/schemas/NewPet' }
      responses: { "200": { description: ok } }
"#,
        );
        let tools = compile("t", &doc, &ApiSourceConfig::default()).unwrap();
        let tool = &tools[0];
        let body = &tool.input_schema["properties"]["requestBody"];
        assert_eq!(body["type"], "object");
        assert_eq!(body["properties"]["name"]["type"], "string");
        assert_eq!(body["properties"]["age"]["type"], "integer");
        assert_eq!(body["properties"]["tags"]["type"], "array");
        assert_eq!(body["required"], serde_json::json!(["name"]));
        assert_eq!(tool.input_schema["required"], serde_json::json!(["requestBody"]));

        let plan_body = tool.plan.body.as_ref().unwrap();
        assert!(plan_body.required);
        assert_eq!(plan_body.properties, vec!["name", "age", "tags"]);
    }

    #[test]
    fn parameter_schemas_collapse_to_primitives() {
        let doc = parse(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /search:
    get:
      operationId: search
      parameters:
        - name: q
          in: query
          required: true
          schema: { type: string }
        - name: limit
          in: query
          schema: { type: integer }
        - name: flags
          in: query
          schema: { type: array, items: { type: string } }
        - name: X-Trace
          in: header
          schema: { type: string }
      responses: { "200": { description: ok } }
"#,
        );
        let tools = compile("t", &doc, &ApiSourceConfig::default()).unwrap();
        let props = &tools[0].input_schema["properties"];
        assert_eq!(props["q"]["type"], "string");
        assert_eq!(props["q"]["description"], "Parameter: q");
        assert_eq!(props["limit"]["type"], "integer");
        assert_eq!(props["flags"]["type"], "array");
        assert_eq!(tools[0].input_schema["required"], serde_json::json!(["q"]));

        let header = tools[0]
            .plan
            .parameters
            .iter()
            .find(|p| p.name == "X-Trace")
            .unwrap();
        assert_eq!(header.location, ParamLocation::Header);
    }

    #[test]
    fn no_ref_survives_into_a_descriptor() {
        let doc = parse(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
components:
  schemas:
    Payload:
      type: object
      properties:
        nested: { $ref: '#/components/schemas/Nested' }
    Nested:
      type: object
      properties:
        x: { type: string }
paths:
  /things:
    post:
      operationId: makeThing
      requestBody:
        content:
          application/json:
            schema: { $ref: '#/components/schemas/Payload' }
      responses: { "200": { description: ok } }
"#,
        );
        let tools = compile("t", &doc, &ApiSourceConfig::default()).unwrap();
        let rendered = serde_json::to_string(&tools[0].input_schema).unwrap();
        assert!(!rendered.contains("$ref"));
        // The nested object is exposed permissively.
        assert_eq!(
            tools[0].input_schema["properties"]["requestBody"]["properties"]["nested"]["type"],
            "object"
        );
    }
}
