//! Error types for `toolbridge-openapi-tools`.
//!
//! These errors never cross the tool-invocation boundary: the executor turns every failure into
//! an [`crate::executor::ExecutionResult`]. They surface from loading and configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (invalid config file, bad override values).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to read spec file '{path}': {source}")]
    SpecRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse spec file '{path}': {source}")]
    SpecParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but is not a usable OpenAPI/Swagger document.
    #[error("invalid spec '{path}': {reason}")]
    InvalidSpec { path: String, reason: String },

    /// A `$ref` could not be resolved.
    #[error("unresolved $ref '{reference}': {reason}")]
    Reference { reference: String, reason: String },

    #[error(transparent)]
    Http(#[from] toolbridge_http_tools::HttpToolsError),
}

/// Result type alias for tool-engine operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
