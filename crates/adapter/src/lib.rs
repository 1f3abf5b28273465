//! HTTP adapter exposing a directory of OpenAPI documents as invocable tools.

pub mod config;
pub mod error;
pub mod routes;

pub use config::{AdapterConfig, Args, LogFormat};
pub use error::{AdapterError, Result};
pub use routes::{AppState, router};
