//! Intra-document `$ref` resolution.
//!
//! The `openapiv3` crate models `$ref`s as `ReferenceOr<T>` but does not
//! resolve them. This resolver follows `#/...` JSON-pointer references
//! against the raw document; external references are rejected and reference
//! cycles surface as `SpecInvalid`.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::ReferenceOr;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

pub struct RefResolver<'a> {
    root: &'a Value,
}

impl<'a> RefResolver<'a> {
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Follow a `ReferenceOr` chain to a concrete item.
    ///
    /// # Errors
    ///
    /// Returns `SpecInvalid` for external references, dangling pointers,
    /// reference cycles, and referenced values of the wrong shape.
    pub fn resolve<T>(&self, item: &ReferenceOr<T>) -> Result<T>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut current: ReferenceOr<T> = item.clone();

        loop {
            match current {
                ReferenceOr::Item(resolved) => return Ok(resolved),
                ReferenceOr::Reference { reference } => {
                    if !seen.insert(reference.clone()) {
                        return Err(OpenApiToolsError::SpecInvalid(format!(
                            "cyclic $ref detected while resolving '{reference}'"
                        )));
                    }
                    let value = self.lookup(&reference)?;
                    current = serde_json::from_value(value.clone()).map_err(|e| {
                        OpenApiToolsError::SpecInvalid(format!(
                            "referenced value '{reference}' has the wrong shape: {e}"
                        ))
                    })?;
                }
            }
        }
    }

    fn lookup(&self, reference: &str) -> Result<&'a Value> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(OpenApiToolsError::SpecInvalid(format!(
                "external $ref not supported: '{reference}'"
            )));
        };
        if !fragment.starts_with('/') {
            return Err(OpenApiToolsError::SpecInvalid(format!(
                "unsupported $ref fragment (expected a JSON pointer): '{reference}'"
            )));
        }
        self.root.pointer(fragment).ok_or_else(|| {
            OpenApiToolsError::SpecInvalid(format!("unresolved $ref '{reference}'"))
        })
    }
}
