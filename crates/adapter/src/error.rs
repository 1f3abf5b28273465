//! Error types for the adapter binary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// Invalid config file, flag or environment value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The listener or logging could not be set up.
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
