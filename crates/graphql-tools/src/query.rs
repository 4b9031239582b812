//! GraphQL query reconstruction.
//!
//! The inverse of filter flattening: fold a flat map of user inputs back
//! into a `where` object literal, render pagination args inline, and wrap
//! the precomputed selection set into the final query string.

use crate::compiler::{FilterLeaf, GraphqlPlan, McpParam};
use crate::introspection::TypeKind;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Build the full query string for one invocation.
///
/// `inputs` must already carry preset parameters merged in. Empty segments
/// are omitted: no `where:` key without filters, no parens without
/// arguments, no braces for scalar-returning fields.
#[must_use]
pub fn build_query(plan: &GraphqlPlan, inputs: &Map<String, Value>) -> String {
    let root = &plan.root_field;
    let where_literal = build_where(plan, inputs);

    let mut args: Vec<String> = Vec::new();
    if !where_literal.is_empty() {
        args.push(format!("where: {where_literal}"));
    }
    for arg in &plan.pagination {
        if let Some(value) = inputs.get(&arg.name).filter(|v| !v.is_null()) {
            args.push(format!("{}: {}", arg.name, render_value(arg.kind, value)));
        }
    }

    let args_segment = if args.is_empty() {
        String::new()
    } else {
        format!(" ({})", args.join(" "))
    };

    if plan.selection_set.is_empty() {
        format!("query Get_{root} {{ {root}{args_segment} }}")
    } else {
        format!(
            "query Get_{root} {{ {root}{args_segment} {{ {} }} }}",
            plan.selection_set
        )
    }
}

/// Rebuild the `where` object literal from flat filter inputs.
///
/// First-level filters (empty `fieldsPath`) render as direct entries; nested
/// filters are grouped by their next field, peeled one level at a time, with
/// sibling groups joined by `, ` inside one object literal.
#[must_use]
pub fn build_where(plan: &GraphqlPlan, inputs: &Map<String, Value>) -> String {
    let selected: Vec<(&McpParam, &Value)> = plan
        .mcp_params
        .iter()
        .filter_map(|p| {
            inputs
                .get(&p.name)
                .filter(|v| !v.is_null())
                .map(|v| (p, v))
        })
        .collect();
    if selected.is_empty() {
        return String::new();
    }

    let (first_level, nested): (Vec<_>, Vec<_>) = selected
        .into_iter()
        .partition(|(p, _)| p.fields_path.is_empty());

    let mut entries: Vec<String> = Vec::new();
    for (param, value) in &first_level {
        let name = match &param.leaf {
            FilterLeaf::Field(name) => name.as_str(),
            FilterLeaf::Operational => param.name.as_str(),
        };
        entries.push(format!("{name}: {}", render_value(param.kind, value)));
    }
    entries.extend(render_level(&nested, 0));

    format!("{{ {} }}", entries.join(", "))
}

fn render_level(items: &[(&McpParam, &Value)], level: usize) -> Vec<String> {
    // Group by the next field, preserving first-seen order.
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<(&McpParam, &Value)>> = HashMap::new();
    for &(param, value) in items {
        let key = param.fields_path[level].as_str();
        if !groups.contains_key(key) {
            order.push(key);
        }
        groups.entry(key).or_default().push((param, value));
    }

    let mut entries = Vec::new();
    for key in order {
        let group = &groups[key];
        let mut parts: Vec<String> = Vec::new();

        for &(param, value) in group {
            if param.fields_path.len() == level + 1 {
                parts.push(render_terminal(param, value));
            }
        }

        let deeper: Vec<(&McpParam, &Value)> = group
            .iter()
            .filter(|(p, _)| p.fields_path.len() > level + 1)
            .copied()
            .collect();
        if !deeper.is_empty() {
            let inner = render_level(&deeper, level + 1);
            parts.push(format!("{{ {} }}", inner.join(", ")));
        }

        for part in parts {
            entries.push(format!("{key}: {part}"));
        }
    }
    entries
}

fn render_terminal(param: &McpParam, value: &Value) -> String {
    match &param.leaf {
        FilterLeaf::Operational => format!("{{ eq: {} }}", render_value(param.kind, value)),
        FilterLeaf::Field(name) => format!("{{ {name}: {} }}", render_value(param.kind, value)),
    }
}

/// Render a JSON input value as a GraphQL value literal.
///
/// Strings are double-quoted (enum values stay bare identifiers), numbers
/// and booleans render raw.
#[must_use]
pub fn render_value(kind: TypeKind, value: &Value) -> String {
    match value {
        Value::String(s) => {
            if kind == TypeKind::Enum {
                s.clone()
            } else {
                format!("\"{}\"", escape_string(s))
            }
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(|v| render_value(kind, v)).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}: {}", render_value(kind, v)))
                .collect();
            format!("{{ {} }}", rendered.join(", "))
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn operational(flat: &str, fields_path: &[&str], type_name: &str) -> McpParam {
        McpParam {
            name: flat.to_string(),
            type_name: type_name.to_string(),
            kind: TypeKind::Scalar,
            path: Vec::new(),
            fields_path: fields_path.iter().map(|s| (*s).to_string()).collect(),
            leaf: FilterLeaf::Operational,
            description: String::new(),
        }
    }

    fn plain(flat: &str, fields_path: &[&str], leaf: &str, type_name: &str) -> McpParam {
        McpParam {
            name: flat.to_string(),
            type_name: type_name.to_string(),
            kind: TypeKind::Scalar,
            path: Vec::new(),
            fields_path: fields_path.iter().map(|s| (*s).to_string()).collect(),
            leaf: FilterLeaf::Field(leaf.to_string()),
            description: String::new(),
        }
    }

    fn plan_with(params: Vec<McpParam>, pagination: Vec<crate::compiler::PaginationArg>) -> GraphqlPlan {
        GraphqlPlan {
            root_field: "users".to_string(),
            selection_set: "id name".to_string(),
            mcp_params: params,
            pagination,
            preset: std::collections::HashMap::new(),
        }
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    /// Braces, brackets and quotes must balance for the literal to embed in
    /// a parseable query.
    fn assert_balanced(s: &str) {
        let mut depth_braces = 0i32;
        let mut depth_brackets = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        for c in s.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth_braces += 1,
                '}' => depth_braces -= 1,
                '[' => depth_brackets += 1,
                ']' => depth_brackets -= 1,
                _ => {}
            }
            assert!(depth_braces >= 0 && depth_brackets >= 0, "unbalanced: {s}");
        }
        assert!(!in_string && depth_braces == 0 && depth_brackets == 0, "unbalanced: {s}");
    }

    #[test]
    fn single_operational_filter_round_trips() {
        let plan = plan_with(vec![operational("name", &["name"], "String")], vec![]);
        let w = build_where(&plan, &inputs(json!({ "name": "Ada" })));
        assert_eq!(w, r#"{ name: { eq: "Ada" } }"#);
        assert_balanced(&w);
    }

    #[test]
    fn sibling_filters_join_inside_one_literal() {
        let plan = plan_with(
            vec![
                operational("name", &["name"], "String"),
                operational("age", &["age"], "Int"),
            ],
            vec![],
        );
        let w = build_where(&plan, &inputs(json!({ "name": "Ada", "age": 30 })));
        assert_eq!(w, r#"{ name: { eq: "Ada" }, age: { eq: 30 } }"#);
        assert_balanced(&w);
    }

    #[test]
    fn nested_filters_peel_one_level_at_a_time() {
        let plan = plan_with(
            vec![operational("address_city", &["address", "city"], "String")],
            vec![],
        );
        let w = build_where(&plan, &inputs(json!({ "address_city": "Paris" })));
        assert_eq!(w, r#"{ address: { city: { eq: "Paris" } } }"#);
        assert_balanced(&w);
    }

    #[test]
    fn branches_under_a_shared_prefix_group_together() {
        let plan = plan_with(
            vec![
                operational("address_city", &["address", "city"], "String"),
                operational("address_zip", &["address", "zip"], "String"),
            ],
            vec![],
        );
        let w = build_where(
            &plan,
            &inputs(json!({ "address_city": "Paris", "address_zip": "75001" })),
        );
        assert_eq!(
            w,
            r#"{ address: { city: { eq: "Paris" }, zip: { eq: "75001" } } }"#
        );
        assert_balanced(&w);
    }

    #[test]
    fn first_level_scalars_render_directly() {
        let plan = plan_with(
            vec![
                plain("id", &[], "id", "Int"),
                operational("name", &["name"], "String"),
            ],
            vec![],
        );
        let w = build_where(&plan, &inputs(json!({ "id": 7, "name": "Ada" })));
        assert_eq!(w, r#"{ id: 7, name: { eq: "Ada" } }"#);
    }

    #[test]
    fn plain_nested_leaf_uses_its_own_name() {
        let plan = plan_with(
            vec![plain("address_city", &["address"], "city", "String")],
            vec![],
        );
        let w = build_where(&plan, &inputs(json!({ "address_city": "Paris" })));
        assert_eq!(w, r#"{ address: { city: "Paris" } }"#);
    }

    #[test]
    fn unset_filters_yield_no_where() {
        let plan = plan_with(vec![operational("name", &["name"], "String")], vec![]);
        assert_eq!(build_where(&plan, &inputs(json!({}))), "");
    }

    #[test]
    fn strings_escape_quotes_and_backslashes() {
        let plan = plan_with(vec![operational("name", &["name"], "String")], vec![]);
        let w = build_where(&plan, &inputs(json!({ "name": "A\"da\\" })));
        assert_eq!(w, "{ name: { eq: \"A\\\"da\\\\\" } }");
        assert_balanced(&w);
    }

    #[test]
    fn full_query_with_filters_and_pagination() {
        let plan = plan_with(
            vec![operational("name", &["name"], "String")],
            vec![
                crate::compiler::PaginationArg {
                    name: "first".to_string(),
                    type_name: "Int".to_string(),
                    kind: TypeKind::Scalar,
                    description: None,
                },
                crate::compiler::PaginationArg {
                    name: "after".to_string(),
                    type_name: "String".to_string(),
                    kind: TypeKind::Scalar,
                    description: None,
                },
            ],
        );
        let q = build_query(
            &plan,
            &inputs(json!({ "name": "Ada", "first": 10, "after": "abc" })),
        );
        assert_eq!(
            q,
            r#"query Get_users { users (where: { name: { eq: "Ada" } } first: 10 after: "abc") { id name } }"#
        );
        assert_balanced(&q);
    }

    #[test]
    fn empty_segments_are_omitted() {
        let plan = plan_with(vec![operational("name", &["name"], "String")], vec![]);
        let q = build_query(&plan, &inputs(json!({})));
        assert_eq!(q, "query Get_users { users { id name } }");

        let scalar_plan = GraphqlPlan {
            selection_set: String::new(),
            ..plan
        };
        let q = build_query(&scalar_plan, &inputs(json!({})));
        assert_eq!(q, "query Get_users { users }");
    }

    #[test]
    fn enum_values_render_bare() {
        let mut param = operational("status", &["status"], "OrderStatus");
        param.kind = TypeKind::Enum;
        let plan = plan_with(vec![param], vec![]);
        let w = build_where(&plan, &inputs(json!({ "status": "SHIPPED" })));
        assert_eq!(w, "{ status: { eq: SHIPPED } }");
    }

    #[test]
    fn list_values_render_as_graphql_lists() {
        let plan = plan_with(vec![operational("tag", &["tag"], "String")], vec![]);
        let w = build_where(&plan, &inputs(json!({ "tag": ["a", "b"] })));
        assert_eq!(w, r#"{ tag: { eq: ["a", "b"] } }"#);
        assert_balanced(&w);
    }
}
