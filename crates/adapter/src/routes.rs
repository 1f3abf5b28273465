//! HTTP front-end over [`ToolService`].

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use toolbridge_http_tools::CredentialSet;
use toolbridge_openapi_tools::{Lookup, ToolService};
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ToolService>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    suggestions: Vec<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            suggestions: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "status": "error", "message": self.message });
        if !self.suggestions.is_empty() {
            body["suggestions"] = json!(self.suggestions);
        }
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvokeRequest {
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginRequest {
    force: bool,
}

/// Empty bodies decode as `T::default()`.
fn optional_json<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: Default + serde::de::DeserializeOwned,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}")))
}

/// Like [`optional_json`] for a mandatory body that may hold secrets: the error names the
/// position of the problem but never echoes the offending value.
fn secret_json<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|e| {
        let kind = match e.classify() {
            serde_json::error::Category::Data => "unexpected shape",
            serde_json::error::Category::Eof => "truncated or empty",
            _ => "malformed",
        };
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!(
                "invalid JSON body ({kind} at line {}, column {})",
                e.line(),
                e.column()
            ),
        )
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/{name}", get(tool_meta).post(invoke))
        .route("/credentials", post(set_credentials))
        .route("/login", post(login))
        .route("/reload", post(reload))
        .route("/specs", get(list_specs))
        .route("/dependencies", get(dependencies))
        .route("/auth/status", get(auth_status))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.service.registry();
    Json(json!({
        "status": "ok",
        "specs": registry.spec_count(),
        "tools": registry.tool_count(),
    }))
}

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.list_tools())
}

async fn tool_meta(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let found = match state.service.registry().lookup(&name) {
        Lookup::Found(tool) => state.service.tool_meta(&tool.name),
        Lookup::NotFound { suggestions } => {
            return Err(ApiError {
                status: StatusCode::NOT_FOUND,
                message: format!("Unknown tool '{name}'"),
                suggestions,
            });
        }
    };
    found
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Unknown tool '{name}'")))
}

/// Always 200: the outcome (including `auth_required`) is carried in the body.
async fn invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: InvokeRequest = optional_json(&body)?;
    debug!(tool = %name, "invoke");
    Ok(Json(state.service.invoke(&name, request.arguments).await))
}

async fn set_credentials(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let credentials: CredentialSet = secret_json(&body)?;
    Ok(Json(state.service.set_credentials(credentials)))
}

async fn login(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let request: LoginRequest = optional_json(&body)?;
    Ok(Json(state.service.login(request.force).await))
}

async fn reload(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.reload().await)
}

async fn list_specs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.list_specs())
}

async fn dependencies(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.dependencies())
}

async fn auth_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.auth_status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolbridge_openapi_tools::EngineConfig;
    use toolbridge_test_support::MockUpstream;

    const PETS: &str = r#"{
      "openapi": "3.0.0",
      "info": {"title": "Pets", "version": "1"},
      "paths": {
        "/pets": {"get": {"operationId": "listPets"}},
        "/pets/{pet_id}": {"get": {"operationId": "getPet",
          "parameters": [{"name": "pet_id", "in": "path", "required": true, "schema": {"type": "integer"}}]}}
      }
    }"#;

    async fn serve(dir: &std::path::Path) -> MockUpstream {
        std::fs::write(dir.join("pets.json"), PETS).expect("write spec");
        let service = ToolService::new(EngineConfig {
            openapi_dir: dir.to_path_buf(),
            force_base_url: Some("http://127.0.0.1:9".to_string()),
            token_cache_path: dir.join("token_cache"),
            ..EngineConfig::default()
        });
        let app = router(AppState {
            service: Arc::new(service),
        });
        MockUpstream::start(app).await.expect("serve router")
    }

    #[tokio::test]
    async fn lists_tools_and_describes_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve(dir.path()).await;
        let client = reqwest::Client::new();

        let tools: Value = client
            .get(server.url("/tools"))
            .send()
            .await
            .expect("GET /tools")
            .json()
            .await
            .expect("json");
        let names: Vec<&str> = tools
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, vec!["pets_listPets", "pets_getPet"]);

        let meta = client
            .get(server.url("/tools/pets_getPet"))
            .send()
            .await
            .expect("GET meta");
        assert_eq!(meta.status(), 200);
        let meta: Value = meta.json().await.expect("json");
        assert_eq!(meta["dependencies"][0]["sourceTool"], json!("pets_listPets"));

        let alias: Value = client
            .get(server.url("/tools/getPet"))
            .send()
            .await
            .expect("GET alias")
            .json()
            .await
            .expect("json");
        assert_eq!(alias["name"], json!("pets_getPet"));

        let missing = client
            .get(server.url("/tools/pets_getPett"))
            .send()
            .await
            .expect("GET unknown");
        assert_eq!(missing.status(), 404);
        let body: Value = missing.json().await.expect("json");
        assert_eq!(body["suggestions"][0], json!("pets_getPet"));
    }

    #[tokio::test]
    async fn invoke_reports_validation_and_auth_outcomes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve(dir.path()).await;
        let client = reqwest::Client::new();

        let invalid: Value = client
            .post(server.url("/tools/pets_getPet"))
            .json(&json!({"arguments": {"pet_id": "abc"}}))
            .send()
            .await
            .expect("POST invoke")
            .json()
            .await
            .expect("json");
        assert_eq!(invalid["status"], json!("error"));
        assert_eq!(invalid["errors"].as_array().map(Vec::len), Some(1));

        // No body at all: no arguments, and no credentials to authenticate with.
        let denied: Value = client
            .post(server.url("/tools/pets_listPets"))
            .send()
            .await
            .expect("POST invoke")
            .json()
            .await
            .expect("json");
        assert_eq!(denied["status"], json!("auth_required"));

        let bad = client
            .post(server.url("/tools/pets_listPets"))
            .body("{not json")
            .send()
            .await
            .expect("POST invoke");
        assert_eq!(bad.status(), 400);
    }

    #[tokio::test]
    async fn credentials_login_and_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve(dir.path()).await;
        let client = reqwest::Client::new();

        let reply: Value = client
            .post(server.url("/credentials"))
            .json(&json!({
                "username": "alice",
                "password": "secret",
                "apiKeyName": "X-Key",
                "apiKeyValue": "v"
            }))
            .send()
            .await
            .expect("POST credentials")
            .json()
            .await
            .expect("json");
        assert_eq!(reply["status"], json!("success"));

        for bad in [r#"{"username": "alice""#, r#"{"username": "alice", "password": 42}"#, ""] {
            let rejected = client
                .post(server.url("/credentials"))
                .header("content-type", "application/json")
                .body(bad)
                .send()
                .await
                .expect("POST credentials");
            assert_eq!(rejected.status(), 400);
            let body: Value = rejected.json().await.expect("json error body");
            assert_eq!(body["status"], json!("error"));
            assert!(!body["message"].to_string().contains("42"), "{body}");
        }

        // Login endpoint is unreachable: a typed error outcome, not a server error.
        let login = client
            .post(server.url("/login"))
            .json(&json!({"force": true}))
            .send()
            .await
            .expect("POST login");
        assert_eq!(login.status(), 200);
        let login: Value = login.json().await.expect("json");
        assert_eq!(login["status"], json!("error"));

        let status: Value = client
            .get(server.url("/auth/status"))
            .send()
            .await
            .expect("GET status")
            .json()
            .await
            .expect("json");
        assert_eq!(status["hasCredentials"], json!(true));
        assert_eq!(status["apiKeyConfigured"], json!(true));
        assert!(!status.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn reload_specs_and_dependencies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = serve(dir.path()).await;
        let client = reqwest::Client::new();

        let specs: Value = client
            .get(server.url("/specs"))
            .send()
            .await
            .expect("GET specs")
            .json()
            .await
            .expect("json");
        assert_eq!(specs[0]["name"], json!("pets"));
        assert_eq!(specs[0]["toolCount"], json!(2));

        let deps: Value = client
            .get(server.url("/dependencies"))
            .send()
            .await
            .expect("GET deps")
            .json()
            .await
            .expect("json");
        assert!(deps.get("pets_getPet").is_some());

        std::fs::remove_file(dir.path().join("pets.json")).expect("rm spec");
        let reload: Value = client
            .post(server.url("/reload"))
            .send()
            .await
            .expect("POST reload")
            .json()
            .await
            .expect("json");
        assert_eq!(
            reload,
            json!({"status": "success", "specsLoaded": 0, "toolsCreated": 0})
        );
        let tools: Value = client
            .get(server.url("/tools"))
            .send()
            .await
            .expect("GET tools")
            .json()
            .await
            .expect("json");
        assert_eq!(tools, json!([]));
    }
}
