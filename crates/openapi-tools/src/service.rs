//! The tool-invocation surface: list, invoke, authenticate and reload.

use crate::config::EngineConfig;
use crate::dependency::{DependencyEdge, DependencyMap};
use crate::executor::{ExecutionResult, Executor};
use crate::model::{SpecKind, ToolDescriptor};
use crate::registry::Registry;
use futures::FutureExt as _;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use toolbridge_http_tools::semantics::{MethodSemantics, semantics_for_method};
use toolbridge_http_tools::{AuthStatus, CredentialSet, LoginOutcome, SessionManager, TokenCache};
use tracing::{error, info};

/// What callers see for each tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub annotations: MethodSemantics,
}

/// Full descriptor plus its dependency hints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMeta {
    #[serde(flatten)]
    pub tool: ToolDescriptor,
    pub input_schema: Value,
    pub annotations: MethodSemantics,
    pub dependencies: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecSummary {
    pub name: String,
    pub kind: SpecKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub base_url: String,
    pub file: String,
    pub tool_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReloadSummary {
    pub status: String,
    pub specs_loaded: usize,
    pub tools_created: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusReply {
    pub status: String,
    pub message: String,
}

/// Owns the current registry snapshot and the session manager.
///
/// Readers clone the snapshot `Arc`; [`ToolService::reload`] builds a new one and swaps it in.
pub struct ToolService {
    config: EngineConfig,
    registry: RwLock<Arc<Registry>>,
    reload_lock: tokio::sync::Mutex<()>,
    sessions: Arc<SessionManager>,
    executor: Executor,
}

impl ToolService {
    /// Build the service and perform the initial load from `config.openapi_dir`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(
            config.session_config(),
            TokenCache::new(config.token_cache_path.clone()),
        ));
        let registry = Registry::load(&config);
        sessions.sync_specs(registry.base_urls());
        info!(
            specs = registry.spec_count(),
            tools = registry.tool_count(),
            "tool registry ready"
        );

        Self {
            executor: Executor::new(&config, Arc::clone(&sessions)),
            config,
            registry: RwLock::new(Arc::new(registry)),
            reload_lock: tokio::sync::Mutex::new(()),
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current snapshot.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry.read())
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.registry()
            .tools()
            .iter()
            .map(|t| ToolInfo {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema(),
                annotations: semantics_for_method(&t.method),
            })
            .collect()
    }

    #[must_use]
    pub fn tool_meta(&self, name: &str) -> Option<ToolMeta> {
        let registry = self.registry();
        let tool = registry.get(name)?;
        Some(ToolMeta {
            tool: tool.as_ref().clone(),
            input_schema: tool.input_schema(),
            annotations: semantics_for_method(&tool.method),
            dependencies: registry.dependencies_for(name).to_vec(),
        })
    }

    /// Invoke a tool. Always yields a result; panics inside the call become `error` results.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ExecutionResult {
        let registry = self.registry();
        let call = self.executor.execute(&registry, name, &arguments);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tool = %name, %reason, "tool invocation panicked");
                ExecutionResult::error(format!("Internal error while invoking '{name}': {reason}"))
            }
        }
    }

    pub fn set_credentials(&self, credentials: CredentialSet) -> StatusReply {
        let username = credentials.username.clone();
        self.sessions.set_credentials(credentials);
        StatusReply {
            status: "success".to_string(),
            message: format!("Credentials set for user '{username}'"),
        }
    }

    pub async fn login(&self, force: bool) -> LoginOutcome {
        self.sessions.login(force).await
    }

    #[must_use]
    pub fn auth_status(&self) -> AuthStatus {
        self.sessions.auth_status()
    }

    /// Re-read the spec directory and swap in a fresh snapshot. Reloads are serialized.
    pub async fn reload(&self) -> ReloadSummary {
        let _guard = self.reload_lock.lock().await;

        let config = self.config.clone();
        let registry = match tokio::task::spawn_blocking(move || Registry::load(&config)).await {
            Ok(registry) => registry,
            Err(e) => {
                error!(error = %e, "spec reload task failed; keeping current registry");
                let current = self.registry();
                return ReloadSummary {
                    status: "error".to_string(),
                    specs_loaded: current.spec_count(),
                    tools_created: current.tool_count(),
                };
            }
        };

        self.sessions.sync_specs(registry.base_urls());
        let summary = ReloadSummary {
            status: "success".to_string(),
            specs_loaded: registry.spec_count(),
            tools_created: registry.tool_count(),
        };
        *self.registry.write() = Arc::new(registry);
        info!(
            specs = summary.specs_loaded,
            tools = summary.tools_created,
            "tool registry reloaded"
        );
        summary
    }

    #[must_use]
    pub fn list_specs(&self) -> Vec<SpecSummary> {
        let registry = self.registry();
        registry
            .specs()
            .map(|s| SpecSummary {
                name: s.name.clone(),
                kind: s.kind,
                title: s.title.clone(),
                version: s.version.clone(),
                base_url: s.base_url.clone(),
                file: s.file.display().to_string(),
                tool_count: registry
                    .tools()
                    .iter()
                    .filter(|t| t.spec_name == s.name)
                    .count(),
            })
            .collect()
    }

    #[must_use]
    pub fn dependencies(&self) -> DependencyMap {
        self.registry().dependencies().clone()
    }
}
