//! OpenAPI/Swagger documents turned into callable tools.
//!
//! [`ToolService`] is the entry point: it loads every document under the configured directory,
//! generates one [`ToolDescriptor`] per operation, and executes invocations against the
//! upstream API with validation, session handling and a single fallback retry.

pub mod config;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod generator;
pub mod loader;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod validation;

pub use config::EngineConfig;
pub use dependency::{DependencyEdge, DependencyMap};
pub use error::{OpenApiToolsError, Result};
pub use executor::{ExecutionResult, ExecutionStatus, Executor};
pub use model::{
    ParamLocation, ParamType, ParameterDescriptor, SpecKind, Specification, ToolDescriptor,
};
pub use registry::{Lookup, Registry};
pub use service::{ReloadSummary, SpecSummary, StatusReply, ToolInfo, ToolMeta, ToolService};
pub use validation::LocatedArgument;
