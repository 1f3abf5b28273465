//! Credential and session lifecycle for wrapped APIs.
//!
//! One [`CredentialSet`] is shared by the whole process; every loaded specification gets its own
//! [`Session`] with a dedicated cookie jar. A successful login stores the session cookie in every
//! jar. An upstream 401/403 on one spec invalidates the rejected token wherever it is held.

use crate::credentials::CredentialSet;
use crate::error::{HttpToolsError, Result};
use crate::safety::{redact_url_str, sanitize_reqwest_error};
use crate::token_cache::TokenCache;
use parking_lot::RwLock;
use reqwest::Client;
use reqwest::cookie::{CookieStore as _, Jar};
use reqwest::header::ACCEPT;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_SESSION_COOKIE: &str = "JSESSIONID";

/// Value some upstream mocks hand out in place of a real session id.
const PLACEHOLDER_TOKEN: &str = "dummy_session_id";

#[must_use]
pub fn is_valid_token(token: &str) -> bool {
    let token = token.trim();
    !token.is_empty() && token != PLACEHOLDER_TOKEN
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Used when the credential set carries no explicit login URL.
    pub default_login_url: Option<String>,
    /// Secondary base URL the executor may retry against; cookies are installed for it too.
    pub fallback_base_url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            default_login_url: None,
            fallback_base_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-specification HTTP state.
pub struct Session {
    spec_name: String,
    base_url: String,
    cookie_urls: Vec<Url>,
    jar: Arc<Jar>,
    client: Client,
    token: RwLock<Option<String>>,
    call_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("spec_name", &self.spec_name)
            .field("base_url", &self.base_url)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL or the HTTP client cannot be built.
    pub fn new(spec_name: &str, base_url: &str, fallback_base_url: Option<&str>) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            HttpToolsError::Config(format!(
                "Invalid base URL '{base_url}' for spec '{spec_name}': {e}"
            ))
        })?;
        let mut cookie_urls = vec![base];
        if let Some(fallback) = fallback_base_url
            && let Ok(u) = Url::parse(fallback)
            && !cookie_urls.contains(&u)
        {
            cookie_urls.push(u);
        }

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            spec_name: spec_name.to_string(),
            base_url: base_url.to_string(),
            cookie_urls,
            jar,
            client,
            token: RwLock::new(None),
            call_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client whose requests carry this session's cookies.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().as_deref().is_some_and(is_valid_token)
    }

    /// Serializes "ensure authenticated, then execute" for this spec.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.call_lock.lock().await
    }

    pub fn install_token(&self, cookie_name: &str, token: &str) {
        let cookie = format!("{cookie_name}={token}; Path=/");
        for url in &self.cookie_urls {
            self.jar.add_cookie_str(&cookie, url);
        }
        *self.token.write() = Some(token.to_string());
    }

    /// Drop the token and expire the session cookie. Returns the token that was held.
    pub fn invalidate(&self, cookie_name: &str) -> Option<String> {
        let expired = format!("{cookie_name}=; Path=/; Max-Age=0");
        for url in &self.cookie_urls {
            self.jar.add_cookie_str(&expired, url);
        }
        self.token.write().take()
    }

    /// The session cookie value currently stored in the jar for the base URL.
    #[must_use]
    pub fn cookie_value(&self, cookie_name: &str) -> Option<String> {
        let url = self.cookie_urls.first()?;
        cookie_from_jar(&self.jar, url, cookie_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub status: LoginStatus,
    pub message: String,
}

impl LoginOutcome {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: LoginStatus::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: LoginStatus::Error,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LoginStatus::Success
    }
}

/// Snapshot of the authentication state. Never includes secrets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub has_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    pub cookie_name: String,
    pub cached_token: bool,
    pub authenticated_specs: Vec<String>,
    pub known_specs: Vec<String>,
}

pub struct SessionManager {
    config: SessionConfig,
    credentials: RwLock<Option<CredentialSet>>,
    /// spec name -> base URL, for every spec in the current registry.
    known_specs: RwLock<BTreeMap<String, String>>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    token_cache: TokenCache,
    login_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: SessionConfig, token_cache: TokenCache) -> Self {
        Self {
            config,
            credentials: RwLock::new(None),
            known_specs: RwLock::new(BTreeMap::new()),
            sessions: RwLock::new(HashMap::new()),
            token_cache,
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    /// Replace the credential set. No I/O.
    pub fn set_credentials(&self, credentials: CredentialSet) {
        info!(username = %credentials.username, "credentials updated");
        *self.credentials.write() = Some(credentials);
    }

    #[must_use]
    pub fn credentials(&self) -> Option<CredentialSet> {
        self.credentials.read().clone()
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.read().is_some()
    }

    /// Align sessions with a freshly built registry (`spec name -> base URL`).
    ///
    /// A session survives whenever its spec still exists with the same base URL, so calls in
    /// flight and new callers keep sharing one call lock. Its token is dropped unless
    /// credentials or a cached token remain available to renew it.
    pub fn sync_specs(&self, specs: BTreeMap<String, String>) {
        let renewable = self.has_credentials() || self.token_cache.load().is_some();
        {
            let mut sessions = self.sessions.write();
            let before = sessions.len();
            sessions.retain(|name, session| {
                specs.get(name).is_some_and(|base| base == session.base_url())
            });
            if !renewable {
                for session in sessions.values().filter(|s| s.token().is_some()) {
                    session.invalidate(&self.config.cookie_name);
                }
            }
            debug!(
                kept = sessions.len(),
                dropped = before - sessions.len(),
                "sessions synchronized with registry"
            );
        }
        *self.known_specs.write() = specs;
    }

    #[must_use]
    pub fn known_specs(&self) -> Vec<String> {
        self.known_specs.read().keys().cloned().collect()
    }

    /// The session for `spec`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if `spec` is not part of the current registry or its session cannot be
    /// constructed.
    pub fn session(&self, spec: &str) -> Result<Arc<Session>> {
        if let Some(s) = self.sessions.read().get(spec) {
            return Ok(Arc::clone(s));
        }

        let base_url = self
            .known_specs
            .read()
            .get(spec)
            .cloned()
            .ok_or_else(|| HttpToolsError::UnknownSpec(spec.to_string()))?;

        let mut sessions = self.sessions.write();
        if let Some(s) = sessions.get(spec) {
            return Ok(Arc::clone(s));
        }
        let session = Arc::new(Session::new(
            spec,
            &base_url,
            self.config.fallback_base_url.as_deref(),
        )?);
        sessions.insert(spec.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Resolve the login endpoint: explicit credential URL, then the configured default, then
    /// `{base URL of the first spec by name}/login`.
    #[must_use]
    pub fn login_url(&self) -> Option<String> {
        if let Some(url) = self
            .credentials
            .read()
            .as_ref()
            .and_then(|c| c.login_url.clone())
            .filter(|u| !u.trim().is_empty())
        {
            return Some(url);
        }
        if let Some(url) = self
            .config
            .default_login_url
            .clone()
            .filter(|u| !u.trim().is_empty())
        {
            return Some(url);
        }
        self.known_specs
            .read()
            .values()
            .next()
            .map(|base| format!("{}/login", base.trim_end_matches('/')))
    }

    /// Obtain a session token and install it on every spec session.
    ///
    /// Unless `force` is set, an existing valid token or the on-disk cache is reused without
    /// network I/O. Logins are serialized.
    pub async fn login(&self, force: bool) -> LoginOutcome {
        let _guard = self.login_lock.lock().await;

        if !force {
            if let Some(token) = self.any_valid_token() {
                self.install_everywhere(&token);
                return LoginOutcome::success("Already authenticated");
            }
            if let Some(token) = self.token_cache.load().filter(|t| is_valid_token(t)) {
                info!("reusing cached session token");
                self.install_everywhere(&token);
                return LoginOutcome::success("Using cached session token");
            }
        }

        let Some(credentials) = self.credentials() else {
            warn!("login requested without credentials");
            return LoginOutcome::error("No credentials set; call set_credentials first");
        };
        let Some(login_url) = self.login_url() else {
            return LoginOutcome::error("No login URL configured and no specifications loaded");
        };

        match self.request_token(&credentials, &login_url).await {
            Ok(token) => {
                self.install_everywhere(&token);
                if let Err(e) = self.token_cache.store(&token) {
                    warn!(
                        error = %e,
                        path = %self.token_cache.path().display(),
                        "failed to write token cache"
                    );
                }
                info!(login_url = %redact_url_str(&login_url), "login successful");
                LoginOutcome::success("Login successful")
            }
            Err(message) => {
                error!(login_url = %redact_url_str(&login_url), %message, "login failed");
                LoginOutcome::error(message)
            }
        }
    }

    /// Whether `spec` can issue authenticated requests, logging in if possible.
    ///
    /// Returns `false` (never an error) when there are neither credentials nor a cached token.
    pub async fn ensure_authenticated(&self, spec: &str) -> bool {
        let session = match self.session(spec) {
            Ok(s) => s,
            Err(e) => {
                warn!(spec = %spec, error = %e, "no session available");
                return false;
            }
        };
        if session.is_authenticated() {
            return true;
        }
        if let Some(token) = self.any_valid_token() {
            session.install_token(&self.config.cookie_name, &token);
            return true;
        }
        if !self.has_credentials() && self.token_cache.load().is_none() {
            debug!(spec = %spec, "no credentials or cached token");
            return false;
        }

        let outcome = self.login(false).await;
        if !outcome.is_success() {
            warn!(spec = %spec, message = %outcome.message, "authentication failed");
            return false;
        }
        session.is_authenticated()
    }

    /// Handle an upstream 401/403 for `spec`: the rejected token is dropped from every session
    /// that holds it and from the token cache.
    pub fn invalidate(&self, spec: &str) {
        let cookie_name = &self.config.cookie_name;
        let rejected = self
            .sessions
            .read()
            .get(spec)
            .and_then(|s| s.invalidate(cookie_name));
        let Some(rejected) = rejected else {
            return;
        };
        warn!(spec = %spec, "session token rejected by upstream");

        for session in self.sessions.read().values() {
            if session.token().as_deref() == Some(rejected.as_str()) {
                session.invalidate(cookie_name);
            }
        }
        match self.token_cache.clear_if_matches(&rejected) {
            Ok(true) => debug!("cleared rejected token from cache"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "failed to clear token cache"),
        }
    }

    #[must_use]
    pub fn auth_status(&self) -> AuthStatus {
        let credentials = self.credentials();
        let mut authenticated_specs: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_authenticated())
            .map(|s| s.spec_name().to_string())
            .collect();
        authenticated_specs.sort();

        AuthStatus {
            has_credentials: credentials.is_some(),
            username: credentials.as_ref().map(|c| c.username.clone()),
            api_key_configured: credentials.as_ref().is_some_and(|c| c.api_key().is_some()),
            login_url: self.login_url().map(|u| redact_url_str(&u)),
            cookie_name: self.config.cookie_name.clone(),
            cached_token: self.token_cache.load().is_some(),
            authenticated_specs,
            known_specs: self.known_specs(),
        }
    }

    fn any_valid_token(&self) -> Option<String> {
        self.sessions
            .read()
            .values()
            .filter_map(|s| s.token())
            .find(|t| is_valid_token(t))
    }

    fn install_everywhere(&self, token: &str) {
        for name in self.known_specs() {
            match self.session(&name) {
                Ok(session) => session.install_token(&self.config.cookie_name, token),
                Err(e) => warn!(spec = %name, error = %e, "cannot install session token"),
            }
        }
    }

    async fn request_token(
        &self,
        credentials: &CredentialSet,
        login_url: &str,
    ) -> std::result::Result<String, String> {
        let url = Url::parse(login_url)
            .map_err(|e| format!("Invalid login URL '{}': {e}", redact_url_str(login_url)))?;

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| sanitize_reqwest_error(&e))?;

        let mut req = client
            .post(url.clone())
            .basic_auth(&credentials.username, Some(&credentials.password))
            .header(ACCEPT, "application/json")
            .timeout(self.config.request_timeout);
        if let Some((name, value)) = credentials.api_key() {
            req = req.header(name, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| format!("Login request failed: {}", sanitize_reqwest_error(&e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("Login failed with HTTP {}", status.as_u16()));
        }

        let cookie_name = &self.config.cookie_name;
        let token = resp
            .cookies()
            .find(|c| c.name() == cookie_name.as_str())
            .map(|c| c.value().to_string())
            .or_else(|| cookie_from_jar(&jar, &url, cookie_name))
            .filter(|t| is_valid_token(t));

        token.ok_or_else(|| format!("Login response did not set a valid {cookie_name} cookie"))
    }
}

fn cookie_from_jar(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}
