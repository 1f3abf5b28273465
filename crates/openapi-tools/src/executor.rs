//! Turns a tool invocation into one upstream HTTP call (plus at most one fallback retry).

use crate::config::EngineConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::model::ToolDescriptor;
use crate::registry::{Lookup, Registry};
use crate::validation::{self, LocatedArgument, scalar_to_string};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use toolbridge_http_tools::safety::{is_transport_failure, redact_url, sanitize_reqwest_error};
use toolbridge_http_tools::semantics::method_carries_body;
use toolbridge_http_tools::{Session, SessionManager};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    AuthRequired,
}

/// Outcome of one invocation. Every failure mode is expressed here, never as a Rust error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Parsed JSON body, raw text, or `null` for an empty body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ExecutionResult {
    fn new(status: ExecutionStatus) -> Self {
        Self {
            status,
            status_code: None,
            response: None,
            message: None,
            hint: None,
            errors: Vec::new(),
            suggestions: Vec::new(),
            url: None,
        }
    }

    #[must_use]
    pub fn success(status_code: u16, response: Value) -> Self {
        Self {
            status_code: Some(status_code),
            response: Some(response),
            ..Self::new(ExecutionStatus::Success)
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ExecutionStatus::Error)
        }
    }

    #[must_use]
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ExecutionStatus::AuthRequired)
        }
    }

    #[must_use]
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    #[must_use]
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    #[must_use]
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: &Url) -> Self {
        self.url = Some(redact_url(url));
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Path, query, headers and body derived from located arguments.
#[derive(Debug, Default, PartialEq)]
struct RequestParts {
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

enum Attempt {
    Answered {
        url: Url,
        status: StatusCode,
        body: Value,
    },
    Unreachable {
        url: Url,
        reason: String,
    },
}

pub struct Executor {
    sessions: Arc<SessionManager>,
    require_auth: bool,
    timeout: Duration,
    fallback_base_url: Option<String>,
}

impl Executor {
    #[must_use]
    pub fn new(config: &EngineConfig, sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            require_auth: config.require_auth,
            timeout: config.request_timeout(),
            fallback_base_url: config.fallback_base_url().map(str::to_string),
        }
    }

    /// Look up, validate, authenticate and call `tool_name` against `registry`.
    pub async fn execute(
        &self,
        registry: &Registry,
        tool_name: &str,
        arguments: &Value,
    ) -> ExecutionResult {
        let tool = match registry.lookup(tool_name) {
            Lookup::Found(tool) => tool,
            Lookup::NotFound { suggestions } => {
                return ExecutionResult::error(format!("Unknown tool '{tool_name}'"))
                    .with_suggestions(suggestions);
            }
        };

        let arguments = validation::clean_arguments(arguments);
        let classified = validation::classify(&tool, &arguments);
        for unknown in &classified.unknown {
            warn!(tool = %tool.name, argument = %unknown, "ignoring unknown argument");
        }

        let errors = validation::validate(&tool, &arguments);
        if !errors.is_empty() {
            debug!(tool = %tool.name, count = errors.len(), "argument validation failed");
            return ExecutionResult::error(format!("Invalid arguments for '{}'", tool.name))
                .with_errors(errors)
                .with_hint(dependency_hint(registry, &tool, &arguments));
        }

        let session = match self.sessions.session(&tool.spec_name) {
            Ok(session) => session,
            Err(e) => return ExecutionResult::error(e.to_string()),
        };

        // Authentication and the call itself are serialized per spec.
        let _guard = session.lock().await;

        if self.require_auth && !self.sessions.ensure_authenticated(&tool.spec_name).await {
            return ExecutionResult::auth_required(format!(
                "Authentication required for '{}': set credentials and log in first",
                tool.spec_name
            ));
        }

        let parts = build_request_parts(&tool, &classified.located);
        self.send(&session, &tool, &parts).await
    }

    async fn send(
        &self,
        session: &Session,
        tool: &ToolDescriptor,
        parts: &RequestParts,
    ) -> ExecutionResult {
        let primary = session.base_url();
        let mut attempt = match self.attempt(session, tool, primary, parts).await {
            Ok(attempt) => attempt,
            Err(e) => return ExecutionResult::error(e.to_string()),
        };

        if let Attempt::Unreachable { url, reason } = &attempt
            && let Some(fallback) = self.fallback_base_url.as_deref()
            && fallback.trim_end_matches('/') != primary.trim_end_matches('/')
        {
            warn!(
                tool = %tool.name,
                url = %redact_url(url),
                %reason,
                "upstream unreachable, retrying against fallback base URL"
            );
            attempt = match self.attempt(session, tool, fallback, parts).await {
                Ok(attempt) => attempt,
                Err(e) => return ExecutionResult::error(e.to_string()),
            };
        }

        match attempt {
            Attempt::Unreachable { url, reason } => ExecutionResult::error(format!(
                "Request to {} failed: {reason}",
                redact_url(&url)
            ))
            .with_url(&url)
            .with_hint(Some(
                "Check that the API is running, or configure FALLBACK_BASE_URL / AUTO_MOCK_FALLBACK"
                    .to_string(),
            )),
            Attempt::Answered { url, status, body } => {
                self.interpret(tool, &url, status, body)
            }
        }
    }

    fn interpret(
        &self,
        tool: &ToolDescriptor,
        url: &Url,
        status: StatusCode,
        body: Value,
    ) -> ExecutionResult {
        let code = status.as_u16();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(tool = %tool.name, status = code, "upstream rejected session");
            self.sessions.invalidate(&tool.spec_name);
            return ExecutionResult::auth_required(format!(
                "Upstream rejected the session (HTTP {code}); log in again"
            ))
            .with_status_code(code)
            .with_response(body)
            .with_url(url);
        }
        if status.is_success() {
            return ExecutionResult::success(code, body).with_url(url);
        }
        ExecutionResult::error(format!(
            "Upstream returned HTTP {code} {}",
            status.canonical_reason().unwrap_or("Unknown")
        ))
        .with_status_code(code)
        .with_response(body)
        .with_url(url)
    }

    async fn attempt(
        &self,
        session: &Session,
        tool: &ToolDescriptor,
        base_url: &str,
        parts: &RequestParts,
    ) -> Result<Attempt> {
        let url = build_url(base_url, &parts.path, &parts.query)?;
        debug!(
            tool = %tool.name,
            method = %tool.method,
            url = %redact_url(&url),
            "sending request"
        );

        let mut request = session
            .client()
            .request(tool.method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .timeout(self.timeout);
        for (name, value) in &parts.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(credentials) = self.sessions.credentials()
            && let Some((name, value)) = credentials.api_key()
        {
            request = request.header(name, value);
        }
        if let Some(body) = &parts.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if is_transport_failure(&e) => {
                return Ok(Attempt::Unreachable {
                    url,
                    reason: sanitize_reqwest_error(&e),
                });
            }
            Err(e) => return Err(OpenApiToolsError::Http(e.into())),
        };

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OpenApiToolsError::Http(e.into()))?;
        debug!(
            tool = %tool.name,
            status = status.as_u16(),
            bytes = bytes.len(),
            "response received"
        );

        Ok(Attempt::Answered {
            url,
            status,
            body: parse_body(&bytes),
        })
    }
}

fn build_request_parts(tool: &ToolDescriptor, located: &[LocatedArgument]) -> RequestParts {
    let mut parts = RequestParts {
        path: tool.path.clone(),
        ..RequestParts::default()
    };
    let mut fields = Map::new();
    let mut raw_body = None;

    for arg in located {
        match arg {
            LocatedArgument::Path { name, value } => {
                let encoded = encode_component(&scalar_to_string(value));
                parts.path = parts.path.replace(&format!("{{{name}}}"), &encoded);
            }
            LocatedArgument::Query { name, value } => match value {
                Value::Array(items) => parts.query.extend(
                    items
                        .iter()
                        .map(|item| (name.clone(), scalar_to_string(item))),
                ),
                other => parts.query.push((name.clone(), scalar_to_string(other))),
            },
            LocatedArgument::Header { name, value } => {
                parts.headers.push((name.clone(), scalar_to_string(value)));
            }
            LocatedArgument::Body { name, value } => {
                fields.insert(name.clone(), value.clone());
            }
            LocatedArgument::RawBody(value) => raw_body = Some(value.clone()),
        }
    }

    if method_carries_body(&tool.method) {
        parts.body = raw_body.or_else(|| (!fields.is_empty()).then_some(Value::Object(fields)));
    }
    parts
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let raw = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&raw)
        .map_err(|e| OpenApiToolsError::Config(format!("Invalid request URL '{raw}': {e}")))?;

    if !query.is_empty() {
        let encoded = query
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&encoded));
    }
    Ok(url)
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn dependency_hint(
    registry: &Registry,
    tool: &ToolDescriptor,
    arguments: &Map<String, Value>,
) -> Option<String> {
    let missing = validation::missing_required(tool, arguments);
    let hints: Vec<String> = registry
        .dependencies_for(&tool.name)
        .iter()
        .filter(|edge| missing.contains(&edge.parameter.as_str()))
        .map(|edge| {
            format!(
                "'{}' can be obtained by calling {}",
                edge.parameter, edge.source_tool
            )
        })
        .collect();
    (!hints.is_empty()).then(|| hints.join("; "))
}
