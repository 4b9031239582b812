//! Introspection → MCP tool compilation.
//!
//! Every field of the query root becomes a tool. Each tool carries:
//! - a precomputed selection set, bounded by `pathDepth` with a
//!   named-type-on-path cycle guard,
//! - pagination params (scalar root-field arguments), and
//! - a flat filter surface: the `where` argument's input-object graph
//!   flattened into [`McpParam`]s whose names join the traversed field chain
//!   with `_`.
//!
//! The inverse transformation (flat inputs → `where` literal) lives in
//! [`crate::query`].

use crate::config::GraphqlSourceConfig;
use crate::error::Result;
use crate::introspection::{
    FieldDef, InputValueDef, SchemaDef, TypeDef, TypeIndex, TypeKind, TypeRef,
};
use serde_json::{Value, json};
use specgate_core::filter::OperationFilter;
use specgate_core::naming::reserve_unique_tool_name;
use std::collections::{HashMap, HashSet};

/// Logical connectors skipped during filter flattening.
const CONNECTOR_FIELDS: [&str; 3] = ["or", "and", "any"];

/// How a flattened filter leaf folds back into the `where` tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterLeaf {
    /// Leaf of an `*OperationFilterInput` type: reconstructed as
    /// `{ eq: <value> }`.
    Operational,
    /// Plain input field: reconstructed as `{ <name>: <value> }` (or as a
    /// direct `<name>: <value>` entry when first-level).
    Field(String),
}

/// One flattened filter parameter.
#[derive(Debug, Clone)]
pub struct McpParam {
    /// Flat identifier exposed in the tool's input schema.
    pub name: String,
    /// Innermost named type of the leaf (e.g. `String`, `Int`).
    pub type_name: String,
    /// Innermost kind of the leaf.
    pub kind: TypeKind,
    /// Input-object type names traversed, starting at the `where` type.
    pub path: Vec<String>,
    /// Input field names traversed (the leaf itself excluded).
    pub fields_path: Vec<String>,
    pub leaf: FilterLeaf,
    pub description: String,
}

/// A scalar root-field argument, rendered inline at call time.
#[derive(Debug, Clone)]
pub struct PaginationArg {
    pub name: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
}

/// Dispatch plan for one query-root field.
#[derive(Debug, Clone)]
pub struct GraphqlPlan {
    pub root_field: String,
    pub selection_set: String,
    pub mcp_params: Vec<McpParam>,
    pub pagination: Vec<PaginationArg>,
    /// Config-provided values injected into every call; these params are
    /// hidden from the input schema.
    pub preset: HashMap<String, Value>,
}

/// A tool compiled from one query-root field.
#[derive(Debug, Clone)]
pub struct GraphqlTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub plan: GraphqlPlan,
}

/// Compile every retained query-root field into a tool.
///
/// # Errors
///
/// Returns `SpecInvalid` when the document carries no usable `__schema`.
pub fn compile(
    source_name: &str,
    doc: &Value,
    config: &GraphqlSourceConfig,
) -> Result<Vec<GraphqlTool>> {
    let schema = SchemaDef::from_document(doc)?;
    let index = TypeIndex::new(&schema);
    let root = index.query_root(&schema)?;
    let filter = OperationFilter::new(&config.whitelist, &config.blacklist);
    let session_description = config.description.clone().unwrap_or_default();

    let mut tools = Vec::new();
    let mut tool_names: HashSet<String> = HashSet::new();

    for field in root.fields.iter().flatten() {
        let virtual_path = format!("/{}", field.name);
        if !filter.retains_operation(Some(&field.name), "QUERY", &virtual_path) {
            continue;
        }

        let tool = compile_root_field(&index, field, config, &filter, &session_description);
        match tool {
            Some(mut tool) => {
                tool.name = reserve_unique_tool_name(&mut tool_names, &tool.name);
                tools.push(tool);
            }
            None => {
                tracing::warn!(
                    source = %source_name,
                    field = %field.name,
                    "skipping root field with no usable surface"
                );
            }
        }
    }

    Ok(tools)
}

fn compile_root_field(
    index: &TypeIndex<'_>,
    field: &FieldDef,
    config: &GraphqlSourceConfig,
    filter: &OperationFilter,
    session_description: &str,
) -> Option<GraphqlTool> {
    let selection_set = build_selection_set(index, &field.type_ref, config.path_depth);
    // Scalar-returning root fields legitimately have no selection set;
    // an object-returning field with nothing selectable is unusable.
    let returns_composite = matches!(
        field.type_ref.innermost().kind,
        TypeKind::Object | TypeKind::Interface | TypeKind::Union
    );
    if selection_set.is_empty() && returns_composite {
        return None;
    }

    let mut preset: HashMap<String, Value> = HashMap::new();

    // Scalar root-field arguments become pagination params.
    let mut pagination = Vec::new();
    for arg in &field.args {
        if arg.name == "where" {
            continue;
        }
        let inner = arg.type_ref.innermost();
        if !matches!(inner.kind, TypeKind::Scalar | TypeKind::Enum) {
            continue;
        }
        if !filter.retains_param(&field.name, &arg.name) {
            continue;
        }
        if let Some(value) = config.preset_params.get(&arg.name) {
            preset.insert(arg.name.clone(), value.clone());
        }
        pagination.push(PaginationArg {
            name: arg.name.clone(),
            type_name: inner.name.clone().unwrap_or_default(),
            kind: inner.kind,
            description: arg.description.clone(),
        });
    }

    // Flatten the `where` argument, when present.
    let mut mcp_params = Vec::new();
    if let Some(where_arg) = field.args.iter().find(|a| a.name == "where") {
        let inner = where_arg.type_ref.innermost();
        if inner.kind == TypeKind::InputObject {
            if let Some(where_type) = inner.name.as_deref().and_then(|n| index.get(n)) {
                mcp_params = flatten_where(index, where_type, config.path_depth);
            }
        }
        mcp_params.retain(|p| {
            if !filter.retains_param(&field.name, &p.name) {
                return false;
            }
            if let Some(value) = config.preset_params.get(&p.name) {
                preset.insert(p.name.clone(), value.clone());
            }
            true
        });
    }

    let input_schema = build_input_schema(&pagination, &mcp_params, &preset);
    let resolved_description = field.description.clone().unwrap_or_default();
    let description =
        format!("MCP description: {session_description}. Tool description: {resolved_description}");

    Some(GraphqlTool {
        name: field.name.clone(),
        description,
        input_schema,
        plan: GraphqlPlan {
            root_field: field.name.clone(),
            selection_set,
            mcp_params,
            pagination,
            preset,
        },
    })
}

// ---------------------------------------------------------------------------
// Selection sets
// ---------------------------------------------------------------------------

/// Build the selection-set body for a return type.
///
/// Deterministic for a given introspection and depth: fields are emitted in
/// introspection order. The emitted nesting is at most `path_depth + 1`
/// levels (the root braces included).
#[must_use]
pub fn build_selection_set(index: &TypeIndex<'_>, type_ref: &TypeRef, path_depth: usize) -> String {
    let inner = type_ref.innermost();
    let Some(name) = inner.name.as_deref() else {
        return String::new();
    };
    let Some(ty) = index.get(name) else {
        return String::new();
    };
    if !matches!(ty.kind, TypeKind::Object | TypeKind::Interface) {
        return String::new();
    }
    let mut path = vec![name.to_string()];
    object_entries(index, ty, path_depth, &mut path).join(" ")
}

fn object_entries(
    index: &TypeIndex<'_>,
    ty: &TypeDef,
    depth_left: usize,
    path: &mut Vec<String>,
) -> Vec<String> {
    let Some(fields) = &ty.fields else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for field in fields {
        // Back-references to the enclosing entity.
        if field.name == "parent" {
            continue;
        }

        let inner = field.type_ref.innermost();
        match inner.kind {
            TypeKind::Scalar | TypeKind::Enum => entries.push(field.name.clone()),
            TypeKind::Object | TypeKind::Interface => {
                if depth_left == 0 {
                    continue;
                }
                let Some(child_name) = inner.name.as_deref() else {
                    continue;
                };
                let Some(child) = index.get(child_name) else {
                    continue;
                };

                // Connection-style pagination nodes stay compact: scalar
                // subfields only, no recursion.
                if field.name == "edges" {
                    let scalars: Vec<String> = child
                        .fields
                        .iter()
                        .flatten()
                        .filter(|f| {
                            matches!(
                                f.type_ref.innermost().kind,
                                TypeKind::Scalar | TypeKind::Enum
                            )
                        })
                        .map(|f| f.name.clone())
                        .collect();
                    if !scalars.is_empty() {
                        entries.push(format!("{} {{ {} }}", field.name, scalars.join(" ")));
                    }
                    continue;
                }

                // A type already on the active path is never re-entered.
                if path.iter().any(|p| p == child_name) {
                    continue;
                }
                path.push(child_name.to_string());
                let nested = object_entries(index, child, depth_left - 1, path);
                path.pop();
                if !nested.is_empty() {
                    entries.push(format!("{} {{ {} }}", field.name, nested.join(" ")));
                }
            }
            _ => {}
        }
    }
    entries
}

// ---------------------------------------------------------------------------
// Filter flattening
// ---------------------------------------------------------------------------

fn flatten_where(index: &TypeIndex<'_>, root: &TypeDef, path_depth: usize) -> Vec<McpParam> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut path = vec![root.name.clone().unwrap_or_default()];
    let mut fields_path = Vec::new();
    walk_input(
        index,
        root,
        path_depth,
        &mut path,
        &mut fields_path,
        &mut out,
        &mut seen,
    );
    out
}

fn walk_input(
    index: &TypeIndex<'_>,
    ty: &TypeDef,
    depth_left: usize,
    path: &mut Vec<String>,
    fields_path: &mut Vec<String>,
    out: &mut Vec<McpParam>,
    seen: &mut HashSet<String>,
) {
    let Some(input_fields) = &ty.input_fields else {
        return;
    };
    let operational = ty
        .name
        .as_deref()
        .is_some_and(|n| n.contains("OperationFilterInput"));

    for field in input_fields {
        if CONNECTOR_FIELDS.contains(&field.name.as_str()) {
            continue;
        }

        if field.type_ref.kind == TypeKind::InputObject {
            if depth_left == 0 {
                continue;
            }
            let Some(child_name) = field.type_ref.name.as_deref() else {
                continue;
            };
            // Cycle guard: a type on the active path is never re-entered.
            if path.iter().any(|p| p == child_name) {
                continue;
            }
            let Some(child) = index.get(child_name) else {
                continue;
            };
            path.push(child_name.to_string());
            fields_path.push(field.name.clone());
            walk_input(index, child, depth_left - 1, path, fields_path, out, seen);
            fields_path.pop();
            path.pop();
            continue;
        }

        // Leaf: scalar, enum, list or non-null wrapper.
        emit_leaf(field, operational, path, fields_path, out, seen);
    }
}

fn emit_leaf(
    field: &InputValueDef,
    operational: bool,
    path: &[String],
    fields_path: &[String],
    out: &mut Vec<McpParam>,
    seen: &mut HashSet<String>,
) {
    let inner = field.type_ref.innermost();
    let type_name = inner.name.clone().unwrap_or_default();

    let (name, leaf, display_path) = if operational && !fields_path.is_empty() {
        (
            fields_path.join("_"),
            FilterLeaf::Operational,
            fields_path.join(" -> "),
        )
    } else if fields_path.is_empty() {
        (
            field.name.clone(),
            FilterLeaf::Field(field.name.clone()),
            field.name.clone(),
        )
    } else {
        let mut display: Vec<&str> = fields_path.iter().map(String::as_str).collect();
        display.push(&field.name);
        (
            format!("{}_{}", fields_path.join("_"), field.name),
            FilterLeaf::Field(field.name.clone()),
            display.join(" -> "),
        )
    };

    // Dedup by flat name: first wins.
    if !seen.insert(name.clone()) {
        return;
    }

    let description = format!(
        "Filter parameter with next hierarcy of fields \"{display_path}\" and type of \"{type_name}\""
    );
    out.push(McpParam {
        name,
        type_name,
        kind: inner.kind,
        path: path.to_vec(),
        fields_path: fields_path.to_vec(),
        leaf,
        description,
    });
}

// ---------------------------------------------------------------------------
// Input schema
// ---------------------------------------------------------------------------

fn build_input_schema(
    pagination: &[PaginationArg],
    mcp_params: &[McpParam],
    preset: &HashMap<String, Value>,
) -> Value {
    let mut properties = serde_json::Map::new();

    for arg in pagination {
        if preset.contains_key(&arg.name) {
            continue;
        }
        let description = arg
            .description
            .clone()
            .unwrap_or_else(|| format!("Parameter: {}", arg.name));
        properties.insert(
            arg.name.clone(),
            scalar_property(&arg.type_name, &description),
        );
    }

    for param in mcp_params {
        if preset.contains_key(&param.name) {
            continue;
        }
        properties.insert(
            param.name.clone(),
            scalar_property(&param.type_name, &param.description),
        );
    }

    json!({
        "type": "object",
        "properties": Value::Object(properties),
    })
}

fn scalar_property(type_name: &str, description: &str) -> Value {
    let ty = match type_name {
        "Int" => "integer",
        "Float" => "number",
        "Boolean" => "boolean",
        _ => "string",
    };
    json!({ "type": ty, "description": description })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scalar(name: &str) -> Value {
        json!({ "kind": "SCALAR", "name": name })
    }

    fn named(kind: &str, name: &str) -> Value {
        json!({ "kind": kind, "name": name })
    }

    /// Introspection fixture: `users(where: UserFilter, first: Int,
    /// tenantId: String)` returning `[User]`, with an operational string
    /// filter, an operational int filter and a nested address filter.
    fn fixture() -> Value {
        json!({
            "data": { "__schema": {
                "queryType": { "name": "Query" },
                "types": [
                    {
                        "kind": "OBJECT", "name": "Query",
                        "fields": [
                            {
                                "name": "users",
                                "description": "All users",
                                "args": [
                                    { "name": "where", "type": named("INPUT_OBJECT", "UserFilter") },
                                    { "name": "first", "type": scalar("Int") },
                                    { "name": "tenantId", "type": scalar("String") }
                                ],
                                "type": { "kind": "LIST", "name": null, "ofType": named("OBJECT", "User") }
                            }
                        ]
                    },
                    {
                        "kind": "OBJECT", "name": "User",
                        "fields": [
                            { "name": "id", "args": [], "type": scalar("ID") },
                            { "name": "name", "args": [], "type": scalar("String") },
                            { "name": "age", "args": [], "type": scalar("Int") },
                            { "name": "parent", "args": [], "type": named("OBJECT", "User") },
                            { "name": "address", "args": [], "type": named("OBJECT", "Address") },
                            { "name": "bestFriend", "args": [], "type": named("OBJECT", "User") }
                        ]
                    },
                    {
                        "kind": "OBJECT", "name": "Address",
                        "fields": [
                            { "name": "city", "args": [], "type": scalar("String") },
                            { "name": "street", "args": [], "type": scalar("String") },
                            { "name": "resident", "args": [], "type": named("OBJECT", "User") }
                        ]
                    },
                    {
                        "kind": "INPUT_OBJECT", "name": "UserFilter",
                        "inputFields": [
                            { "name": "and", "type": named("INPUT_OBJECT", "UserFilter") },
                            { "name": "or", "type": named("INPUT_OBJECT", "UserFilter") },
                            { "name": "name", "type": named("INPUT_OBJECT", "StringOperationFilterInput") },
                            { "name": "age", "type": named("INPUT_OBJECT", "IntOperationFilterInput") },
                            { "name": "address", "type": named("INPUT_OBJECT", "AddressFilter") }
                        ]
                    },
                    {
                        "kind": "INPUT_OBJECT", "name": "AddressFilter",
                        "inputFields": [
                            { "name": "city", "type": named("INPUT_OBJECT", "StringOperationFilterInput") }
                        ]
                    },
                    {
                        "kind": "INPUT_OBJECT", "name": "StringOperationFilterInput",
                        "inputFields": [
                            { "name": "eq", "type": scalar("String") },
                            { "name": "neq", "type": scalar("String") },
                            { "name": "contains", "type": scalar("String") }
                        ]
                    },
                    {
                        "kind": "INPUT_OBJECT", "name": "IntOperationFilterInput",
                        "inputFields": [
                            { "name": "eq", "type": scalar("Int") },
                            { "name": "gt", "type": scalar("Int") }
                        ]
                    }
                ]
            }}
        })
    }

    fn compile_fixture(config: GraphqlSourceConfig) -> Vec<GraphqlTool> {
        compile("test", &fixture(), &config).unwrap()
    }

    #[test]
    fn one_tool_per_root_field() {
        let tools = compile_fixture(GraphqlSourceConfig::default());
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "users");
        assert_eq!(tools[0].plan.root_field, "users");
    }

    #[test]
    fn selection_set_recurses_and_skips_parent_and_cycles() {
        let tools = compile_fixture(GraphqlSourceConfig::default());
        let selection = &tools[0].plan.selection_set;
        // Scalars verbatim; `parent` skipped; User is on the path inside
        // Address, so `resident` is not re-entered.
        assert_eq!(selection, "id name age address { city street }");
    }

    #[test]
    fn selection_set_is_deterministic() {
        let a = compile_fixture(GraphqlSourceConfig::default());
        let b = compile_fixture(GraphqlSourceConfig::default());
        assert_eq!(a[0].plan.selection_set, b[0].plan.selection_set);
    }

    #[test]
    fn depth_zero_keeps_only_scalars() {
        let tools = compile_fixture(GraphqlSourceConfig {
            path_depth: 0,
            ..GraphqlSourceConfig::default()
        });
        assert_eq!(tools[0].plan.selection_set, "id name age");
    }

    #[test]
    fn emitted_nesting_is_bounded_by_depth_plus_one() {
        for depth in 0..4 {
            let tools = compile_fixture(GraphqlSourceConfig {
                path_depth: depth,
                ..GraphqlSourceConfig::default()
            });
            let selection = &tools[0].plan.selection_set;
            let mut level: usize = 1; // the root braces around the selection
            let mut max_level = level;
            for c in selection.chars() {
                match c {
                    '{' => {
                        level += 1;
                        max_level = max_level.max(level);
                    }
                    '}' => level -= 1,
                    _ => {}
                }
            }
            assert!(max_level <= depth + 1, "depth {depth} produced nesting {max_level}");
        }
    }

    #[test]
    fn where_flattening_produces_operational_and_nested_params() {
        let tools = compile_fixture(GraphqlSourceConfig::default());
        let params = &tools[0].plan.mcp_params;
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        // `eq`/`neq`/`contains` dedup to one flat name per filter field
        // (first wins), connectors are skipped.
        assert_eq!(names, vec!["name", "age", "address_city"]);

        let name = &params[0];
        assert_eq!(name.leaf, FilterLeaf::Operational);
        assert_eq!(name.type_name, "String");
        assert_eq!(name.fields_path, vec!["name"]);
        assert_eq!(name.path, vec!["UserFilter", "StringOperationFilterInput"]);
        assert_eq!(
            name.description,
            "Filter parameter with next hierarcy of fields \"name\" and type of \"String\""
        );

        let city = &params[2];
        assert_eq!(city.fields_path, vec!["address", "city"]);
        assert_eq!(
            city.path,
            vec!["UserFilter", "AddressFilter", "StringOperationFilterInput"]
        );
    }

    #[test]
    fn filter_descent_respects_path_depth() {
        let tools = compile_fixture(GraphqlSourceConfig {
            path_depth: 1,
            ..GraphqlSourceConfig::default()
        });
        let names: Vec<&str> = tools[0]
            .plan
            .mcp_params
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        // Depth 1 reaches the operational filters right under the root but
        // not the leaves below AddressFilter.
        assert_eq!(names, vec!["name", "age"]);
    }

    #[test]
    fn pagination_args_are_scalar_root_args() {
        let tools = compile_fixture(GraphqlSourceConfig::default());
        let pagination = &tools[0].plan.pagination;
        let names: Vec<&str> = pagination.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["first", "tenantId"]);
        assert_eq!(pagination[0].type_name, "Int");
    }

    #[test]
    fn input_schema_maps_scalar_kinds() {
        let tools = compile_fixture(GraphqlSourceConfig::default());
        let props = &tools[0].input_schema["properties"];
        assert_eq!(props["first"]["type"], "integer");
        assert_eq!(props["name"]["type"], "string");
        assert_eq!(props["age"]["type"], "integer");
        assert_eq!(props["address_city"]["type"], "string");
    }

    #[test]
    fn preset_params_are_hidden_but_recorded() {
        let mut preset = HashMap::new();
        preset.insert("tenantId".to_string(), json!("t1"));
        let tools = compile_fixture(GraphqlSourceConfig {
            preset_params: preset,
            ..GraphqlSourceConfig::default()
        });
        let props = tools[0].input_schema["properties"].as_object().unwrap();
        assert!(!props.contains_key("tenantId"));
        assert_eq!(tools[0].plan.preset.get("tenantId"), Some(&json!("t1")));
    }

    #[test]
    fn param_blacklist_drops_single_filter() {
        let tools = compile_fixture(GraphqlSourceConfig {
            blacklist: vec!["users.age".to_string()],
            ..GraphqlSourceConfig::default()
        });
        let names: Vec<&str> = tools[0]
            .plan
            .mcp_params
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["name", "address_city"]);
    }

    #[test]
    fn root_field_blacklist_removes_tool() {
        let tools = compile_fixture(GraphqlSourceConfig {
            blacklist: vec!["users".to_string()],
            ..GraphqlSourceConfig::default()
        });
        assert!(tools.is_empty());
    }

    #[test]
    fn tool_names_are_unique() {
        let tools = compile_fixture(GraphqlSourceConfig::default());
        let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn edges_fields_keep_only_scalar_subfields() {
        let doc = json!({
            "data": { "__schema": {
                "queryType": { "name": "Query" },
                "types": [
                    {
                        "kind": "OBJECT", "name": "Query",
                        "fields": [
                            { "name": "items", "args": [], "type": named("OBJECT", "ItemConnection") }
                        ]
                    },
                    {
                        "kind": "OBJECT", "name": "ItemConnection",
                        "fields": [
                            { "name": "totalCount", "args": [], "type": scalar("Int") },
                            { "name": "edges", "args": [], "type": named("OBJECT", "ItemEdge") }
                        ]
                    },
                    {
                        "kind": "OBJECT", "name": "ItemEdge",
                        "fields": [
                            { "name": "cursor", "args": [], "type": scalar("String") },
                            { "name": "node", "args": [], "type": named("OBJECT", "Item") }
                        ]
                    },
                    {
                        "kind": "OBJECT", "name": "Item",
                        "fields": [ { "name": "id", "args": [], "type": scalar("ID") } ]
                    }
                ]
            }}
        });
        let tools = compile("test", &doc, &GraphqlSourceConfig::default()).unwrap();
        assert_eq!(tools[0].plan.selection_set, "totalCount edges { cursor }");
    }
}
