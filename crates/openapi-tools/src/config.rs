use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use toolbridge_http_tools::SessionConfig;
use toolbridge_http_tools::session::DEFAULT_SESSION_COOKIE;

pub const DEFAULT_OPENAPI_DIR: &str = "./openapi_specs";
pub const DEFAULT_MOCK_API_BASE_URL: &str = "http://127.0.0.1:9001";
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TOKEN_CACHE_PATH: &str = ".token_cache";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Environment variable prefix for per-spec base URL overrides (`FORCE_BASE_URL_<NAME>`).
pub const BASE_URL_OVERRIDE_PREFIX: &str = "FORCE_BASE_URL_";

/// Engine configuration: where specs live, how base URLs are chosen, and how requests and
/// sessions behave.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub openapi_dir: PathBuf,

    /// Global base URL override applied to every spec.
    pub force_base_url: Option<String>,

    /// Per-spec base URL overrides keyed by upper-cased spec name.
    pub base_url_overrides: BTreeMap<String, String>,

    /// Route every spec to `mock_api_base_url`.
    pub mock_all: bool,
    pub mock_api_base_url: String,

    /// Retry transport failures against `mock_api_base_url` when no explicit fallback is set.
    pub auto_mock_fallback: bool,
    pub fallback_base_url: Option<String>,

    pub request_timeout_secs: u64,

    pub default_login_url: Option<String>,
    pub session_cookie_name: String,
    pub token_cache_path: PathBuf,

    /// When false, tools execute without establishing a session first.
    pub require_auth: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            openapi_dir: PathBuf::from(DEFAULT_OPENAPI_DIR),
            force_base_url: None,
            base_url_overrides: BTreeMap::new(),
            mock_all: false,
            mock_api_base_url: DEFAULT_MOCK_API_BASE_URL.to_string(),
            auto_mock_fallback: false,
            fallback_base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            default_login_url: None,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            token_cache_path: PathBuf::from(DEFAULT_TOKEN_CACHE_PATH),
            require_auth: true,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Per-spec override for `spec_name`, if configured.
    #[must_use]
    pub fn base_url_override(&self, spec_name: &str) -> Option<&str> {
        self.base_url_overrides
            .get(&override_key(spec_name))
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Where a failed request is retried, if anywhere.
    #[must_use]
    pub fn fallback_base_url(&self) -> Option<&str> {
        if let Some(url) = self
            .fallback_base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            return Some(url);
        }
        self.auto_mock_fallback
            .then_some(self.mock_api_base_url.as_str())
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cookie_name: self.session_cookie_name.clone(),
            default_login_url: self.default_login_url.clone(),
            fallback_base_url: self.fallback_base_url().map(str::to_string),
            request_timeout: self.request_timeout(),
        }
    }

    /// Merge `FORCE_BASE_URL_<NAME>` entries from `vars` into the per-spec overrides.
    ///
    /// Existing entries win over the environment.
    pub fn absorb_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(BASE_URL_OVERRIDE_PREFIX) else {
                continue;
            };
            if name.is_empty() || value.trim().is_empty() {
                continue;
            }
            self.base_url_overrides
                .entry(override_key(name))
                .or_insert(value);
        }
    }
}

/// Key under which a spec's base URL override is stored.
#[must_use]
pub fn override_key(spec_name: &str) -> String {
    spec_name.to_ascii_uppercase()
}
