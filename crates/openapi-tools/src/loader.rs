//! Spec document loading.
//!
//! Locations starting with `http://`/`https://` are fetched over HTTP GET;
//! anything else is read from the local filesystem. Documents parse as JSON
//! or YAML (JSON is a valid subset of YAML, so one parser covers both).

use crate::error::{OpenApiToolsError, Result};
use crate::overlay::{self, OverlayDocument};
use reqwest::Client;
use serde_json::Value;
use url::Url;

pub struct SpecLoader {
    client: Client,
}

impl SpecLoader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Load and parse a single document from a URL or file path.
    ///
    /// # Errors
    ///
    /// Returns `SpecNotFound` when the location cannot be read/fetched and
    /// `SpecParse` when its content is neither valid JSON nor valid YAML.
    pub async fn load_document(&self, location: &str, headers: &[(String, String)]) -> Result<Value> {
        let content = self.read_location(location, headers).await?;
        parse_document(location, &content)
    }

    /// Load the primary OpenAPI document and apply overlays in list order,
    /// each fully applied before the next.
    ///
    /// # Errors
    ///
    /// Returns an error if the primary document or any overlay cannot be
    /// loaded or parsed. Overlay actions whose target matches nothing are
    /// logged and skipped.
    pub async fn load_openapi(
        &self,
        primary: &str,
        overlays: &[String],
        headers: &[(String, String)],
    ) -> Result<Value> {
        tracing::info!(spec = %primary, overlays = overlays.len(), "loading OpenAPI spec");
        let mut doc = self.load_document(primary, headers).await?;

        for location in overlays {
            let raw = self.load_document(location, headers).await?;
            let overlay: OverlayDocument = serde_json::from_value(raw).map_err(|e| {
                OpenApiToolsError::SpecParse {
                    location: location.clone(),
                    message: format!("not an overlay document: {e}"),
                }
            })?;
            overlay::apply_overlay(&mut doc, &overlay);
        }

        Ok(doc)
    }

    async fn read_location(&self, location: &str, headers: &[(String, String)]) -> Result<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::SpecNotFound(format!("invalid URL '{location}': {e}"))
            })?;

            let mut req = self.client.get(url);
            for (name, value) in headers {
                req = req.header(name, value);
            }
            let resp = req.send().await.map_err(|e| {
                OpenApiToolsError::SpecNotFound(format!("failed to fetch '{location}': {e}"))
            })?;
            if !resp.status().is_success() {
                return Err(OpenApiToolsError::SpecNotFound(format!(
                    "fetching '{location}' returned {}",
                    resp.status()
                )));
            }
            resp.text().await.map_err(|e| {
                OpenApiToolsError::SpecNotFound(format!("failed to read '{location}': {e}"))
            })
        } else {
            std::fs::read_to_string(location).map_err(|e| {
                OpenApiToolsError::SpecNotFound(format!("failed to read file '{location}': {e}"))
            })
        }
    }
}

fn parse_document(location: &str, content: &str) -> Result<Value> {
    serde_json::from_str(content)
        .or_else(|_| serde_yaml::from_str(content))
        .map_err(|e| OpenApiToolsError::SpecParse {
            location: location.to_string(),
            message: e.to_string(),
        })
}
