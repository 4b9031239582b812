//! Preset upstream authentication.

use std::collections::HashMap;

/// Authentication preset resolved from source config.
///
/// Resolution order: `securityCredentials[securitySchemeName]` wins over a
/// bare `apiKey`. Values that already carry a scheme (`Basic xxx`,
/// `Bearer xxx`) are used verbatim; bare tokens get `Bearer ` prepended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthPreset {
    header: Option<(String, String)>,
}

impl AuthPreset {
    #[must_use]
    pub fn resolve(
        api_key: Option<&str>,
        security_scheme_name: Option<&str>,
        security_credentials: &HashMap<String, String>,
    ) -> Self {
        let credential = security_scheme_name
            .and_then(|scheme| security_credentials.get(scheme))
            .map(String::as_str)
            .or(api_key);

        let header = credential.filter(|c| !c.is_empty()).map(|c| {
            let value = if c.contains(' ') {
                c.to_string()
            } else {
                format!("Bearer {c}")
            };
            ("Authorization".to_string(), value)
        });

        Self { header }
    }

    #[must_use]
    pub fn header(&self) -> Option<(&str, &str)> {
        self.header
            .as_ref()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}
