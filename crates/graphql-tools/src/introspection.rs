//! GraphQL introspection: query constant, response model, type index.
//!
//! The type graph is cyclic, so nothing here holds references between types.
//! All introspected types live in one flat table keyed by name; traversals
//! carry an explicit set of named types on the active path.

use crate::error::{GraphqlToolsError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Introspection query sent to the upstream endpoint.
///
/// `ofType` nests seven levels, enough for any practical wrapper stack
/// (e.g. `[T!]!` is three).
pub const INTROSPECTION_QUERY: &str = "\
query IntrospectionQuery { __schema { queryType { name } types { kind name description \
fields(includeDeprecated: true) { name description args { name description type { ...TypeRef } } \
type { ...TypeRef } } inputFields { name description type { ...TypeRef } } } } } \
fragment TypeRef on __Type { kind name ofType { kind name ofType { kind name ofType { kind name \
ofType { kind name ofType { kind name ofType { kind name ofType { kind name } } } } } } } }";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeRef {
    pub kind: TypeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "ofType")]
    pub of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    /// Follow `NON_NULL`/`LIST` wrappers to the innermost type.
    #[must_use]
    pub fn innermost(&self) -> &TypeRef {
        let mut current = self;
        while matches!(current.kind, TypeKind::NonNull | TypeKind::List) {
            match &current.of_type {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }

    #[must_use]
    pub fn innermost_name(&self) -> &str {
        self.innermost().name.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputValueDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: Vec<InputValueDef>,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeDef {
    pub kind: TypeKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldDef>>,
    #[serde(default, rename = "inputFields")]
    pub input_fields: Option<Vec<InputValueDef>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedTypeRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDef {
    #[serde(default, rename = "queryType")]
    pub query_type: Option<NamedTypeRef>,
    pub types: Vec<TypeDef>,
}

impl SchemaDef {
    /// Parse an introspection document: either the raw HTTP response shape
    /// `{"data": {"__schema": ...}}` or a bare `{"__schema": ...}`.
    ///
    /// # Errors
    ///
    /// Returns `SpecInvalid` when no `__schema` node is present or it does
    /// not deserialize.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let schema = doc
            .pointer("/data/__schema")
            .or_else(|| doc.get("__schema"))
            .ok_or_else(|| {
                GraphqlToolsError::SpecInvalid("no __schema in introspection document".to_string())
            })?;
        serde_json::from_value(schema.clone())
            .map_err(|e| GraphqlToolsError::SpecInvalid(format!("bad __schema shape: {e}")))
    }

    /// The name of the query root type (`Query` unless declared otherwise).
    #[must_use]
    pub fn query_type_name(&self) -> &str {
        self.query_type
            .as_ref()
            .and_then(|t| t.name.as_deref())
            .unwrap_or("Query")
    }
}

/// Flat table of named types.
pub struct TypeIndex<'a> {
    by_name: HashMap<&'a str, &'a TypeDef>,
}

impl<'a> TypeIndex<'a> {
    #[must_use]
    pub fn new(schema: &'a SchemaDef) -> Self {
        let mut by_name = HashMap::new();
        for ty in &schema.types {
            if let Some(name) = ty.name.as_deref() {
                by_name.insert(name, ty);
            }
        }
        Self { by_name }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a TypeDef> {
        self.by_name.get(name).copied()
    }

    /// The query root type definition.
    ///
    /// # Errors
    ///
    /// Returns `SpecInvalid` when the declared query type is missing from
    /// the type table.
    pub fn query_root(&self, schema: &SchemaDef) -> Result<&'a TypeDef> {
        let name = schema.query_type_name();
        self.get(name).ok_or_else(|| {
            GraphqlToolsError::SpecInvalid(format!("query type '{name}' not found in introspection"))
        })
    }
}
