//! Error types for `specgate-openapi-tools`.

use thiserror::Error;

/// Main error type for OpenAPI tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// The spec (or an overlay) could not be located or fetched.
    #[error("Spec not found: {0}")]
    SpecNotFound(String),

    /// The raw document failed to parse as JSON/YAML.
    #[error("Failed to parse spec from '{location}': {message}")]
    SpecParse { location: String, message: String },

    /// The document parsed but is not a usable OpenAPI spec
    /// (structural problems, cyclic `$ref`s, external `$ref`s).
    #[error("Invalid spec: {0}")]
    SpecInvalid(String),

    /// Configuration errors (invalid config, missing fields).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required tool argument was not supplied.
    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    /// No compiled tool has this name.
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    /// The upstream API answered with a non-success status.
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus {
        status: u16,
        body: serde_json::Value,
    },

    /// The upstream request never produced a response (DNS, connect,
    /// timeout, ...).
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Internal invariant violations at call time.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for OpenAPI tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
