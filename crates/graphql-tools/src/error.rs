//! Error types for `specgate-graphql-tools`.

use thiserror::Error;

/// Main error type for GraphQL tooling.
#[derive(Error, Debug)]
pub enum GraphqlToolsError {
    /// The introspection endpoint could not be reached.
    #[error("Introspection endpoint unreachable: {0}")]
    SpecNotFound(String),

    /// The introspection response failed to parse.
    #[error("Failed to parse introspection from '{location}': {message}")]
    SpecParse { location: String, message: String },

    /// The introspection parsed but is structurally unusable.
    #[error("Invalid introspection: {0}")]
    SpecInvalid(String),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No compiled tool has this name.
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    /// The upstream answered with a non-success status.
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus {
        status: u16,
        body: serde_json::Value,
    },

    /// HTTP 2xx carrying GraphQL `errors` with `data: null`.
    #[error("GraphQL execution failed: {errors}")]
    ExecutionErrors { errors: serde_json::Value },

    /// The upstream request never produced a response.
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Internal invariant violations at call time.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for GraphQL tooling operations.
pub type Result<T> = std::result::Result<T, GraphqlToolsError>;
