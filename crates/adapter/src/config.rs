//! Command line, environment and config-file handling.
//!
//! Precedence, highest first: flags / environment variables, the `--config` YAML file,
//! built-in defaults. `FORCE_BASE_URL_<NAME>` variables are merged last and never override a
//! per-spec URL set elsewhere.

use crate::error::{AdapterError, Result};
use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use toolbridge_http_tools::CredentialSet;
use toolbridge_openapi_tools::EngineConfig;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "toolbridge-adapter",
    version,
    about = "Serve every operation of a directory of OpenAPI documents as an invocable tool"
)]
pub struct Args {
    /// YAML config file.
    #[arg(long, env = "TOOLBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "MCP_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "MCP_PORT")]
    pub port: Option<u16>,

    /// `tracing` filter directive, e.g. `info` or `toolbridge_openapi_tools=debug`.
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Directory scanned (recursively) for `.yaml`, `.yml` and `.json` documents.
    #[arg(long, env = "OPENAPI_DIR")]
    pub openapi_dir: Option<PathBuf>,

    /// Base URL used for every spec.
    #[arg(long, env = "FORCE_BASE_URL")]
    pub force_base_url: Option<String>,

    /// Per-spec base URL, `NAME=URL`. Repeatable.
    #[arg(long = "base-url-override", value_name = "NAME=URL", value_parser = parse_key_val)]
    pub base_url_overrides: Vec<(String, String)>,

    #[arg(long, env = "MOCK_ALL", value_parser = BoolishValueParser::new())]
    pub mock_all: Option<bool>,

    #[arg(long, env = "MOCK_API_BASE_URL")]
    pub mock_api_base_url: Option<String>,

    #[arg(long, env = "AUTO_MOCK_FALLBACK", value_parser = BoolishValueParser::new())]
    pub auto_mock_fallback: Option<bool>,

    #[arg(long, env = "FALLBACK_BASE_URL")]
    pub fallback_base_url: Option<String>,

    /// Upstream request timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    #[arg(long, env = "DEFAULT_LOGIN_URL")]
    pub default_login_url: Option<String>,

    #[arg(long, env = "SESSION_COOKIE_NAME")]
    pub session_cookie_name: Option<String>,

    #[arg(long, env = "TOKEN_CACHE_PATH")]
    pub token_cache_path: Option<PathBuf>,

    #[arg(long, env = "REQUIRE_AUTH", value_parser = BoolishValueParser::new())]
    pub require_auth: Option<bool>,

    #[arg(long, env = "API_USERNAME")]
    pub api_username: Option<String>,

    #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
    pub api_password: Option<String>,

    #[arg(long, env = "API_KEY_NAME")]
    pub api_key_name: Option<String>,

    #[arg(long, env = "API_KEY_VALUE", hide_env_values = true)]
    pub api_key_value: Option<String>,

    #[arg(long, env = "LOGIN_URL")]
    pub login_url: Option<String>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (name, url) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=URL, got '{s}'"))?;
    if name.trim().is_empty() || url.trim().is_empty() {
        return Err(format!("expected NAME=URL, got '{s}'"));
    }
    Ok((name.trim().to_string(), url.trim().to_string()))
}

/// Shape of the `--config` YAML file. Engine settings sit at the top level.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub credentials: Option<CredentialSet>,
}

impl FileConfig {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for this shape.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }
}

/// Fully resolved adapter settings.
#[derive(Debug)]
pub struct AdapterConfig {
    pub engine: EngineConfig,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Installed before the first request when present.
    pub credentials: Option<CredentialSet>,
}

impl AdapterConfig {
    /// Merge `args` over the optional config file, then absorb `FORCE_BASE_URL_<NAME>` from
    /// `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or only half of a username/password
    /// pair is given.
    pub fn resolve<I>(args: Args, env: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let mut engine = file.engine;
        if let Some(v) = args.openapi_dir {
            engine.openapi_dir = v;
        }
        if let Some(v) = args.force_base_url {
            engine.force_base_url = Some(v);
        }
        for (name, url) in args.base_url_overrides {
            engine
                .base_url_overrides
                .insert(toolbridge_openapi_tools::config::override_key(&name), url);
        }
        if let Some(v) = args.mock_all {
            engine.mock_all = v;
        }
        if let Some(v) = args.mock_api_base_url {
            engine.mock_api_base_url = v;
        }
        if let Some(v) = args.auto_mock_fallback {
            engine.auto_mock_fallback = v;
        }
        if let Some(v) = args.fallback_base_url {
            engine.fallback_base_url = Some(v);
        }
        if let Some(v) = args.request_timeout {
            engine.request_timeout_secs = v;
        }
        if let Some(v) = args.default_login_url {
            engine.default_login_url = Some(v);
        }
        if let Some(v) = args.session_cookie_name {
            engine.session_cookie_name = v;
        }
        if let Some(v) = args.token_cache_path {
            engine.token_cache_path = v;
        }
        if let Some(v) = args.require_auth {
            engine.require_auth = v;
        }
        engine.absorb_env_overrides(env);

        let credentials = match (args.api_username, args.api_password) {
            (Some(user), Some(password)) => {
                let mut set = CredentialSet::new(user, password);
                if let (Some(name), Some(value)) = (args.api_key_name, args.api_key_value) {
                    set = set.with_api_key(name, value);
                }
                if let Some(url) = args.login_url {
                    set = set.with_login_url(url);
                }
                Some(set)
            }
            (None, None) => file.credentials,
            _ => {
                return Err(AdapterError::Config(
                    "API_USERNAME and API_PASSWORD must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            engine,
            host: args
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            log_level: args
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: args.log_format.or(file.log_format).unwrap_or_default(),
            credentials,
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["toolbridge-adapter"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).expect("args")
    }

    #[test]
    fn defaults_without_flags_or_file() {
        let cfg = AdapterConfig::resolve(Args::default(), Vec::new()).expect("resolve");
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8000");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert_eq!(cfg.engine, EngineConfig::default());
        assert!(cfg.credentials.is_none());
    }

    #[test]
    fn flags_win_over_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("adapter.yaml");
        std::fs::write(
            &path,
            "openapiDir: /srv/specs\nrequestTimeoutSecs: 5\nrequireAuth: false\nport: 9100\n\
             logFormat: json\ncredentials: {username: bob, password: pw}\n",
        )
        .expect("write config");

        let args = parse(&[
            "--config",
            path.to_str().expect("utf8 path"),
            "--request-timeout",
            "12",
            "--base-url-override",
            "bank=http://bank.test",
        ]);
        let cfg = AdapterConfig::resolve(args, Vec::new()).expect("resolve");

        assert_eq!(cfg.engine.openapi_dir, PathBuf::from("/srv/specs"));
        assert_eq!(cfg.engine.request_timeout(), Duration::from_secs(12));
        assert!(!cfg.engine.require_auth);
        assert_eq!(cfg.engine.base_url_override("bank"), Some("http://bank.test"));
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.credentials.map(|c| c.username), Some("bob".to_string()));
    }

    #[test]
    fn env_overrides_and_credentials() {
        let args = parse(&[
            "--api-username",
            "alice",
            "--api-password",
            "secret",
            "--api-key-name",
            "X-API-Key",
            "--api-key-value",
            "k",
            "--require-auth",
            "no",
        ]);
        let env = vec![
            ("FORCE_BASE_URL_PAY".to_string(), "http://pay.test".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let cfg = AdapterConfig::resolve(args, env).expect("resolve");
        assert_eq!(cfg.engine.base_url_override("pay"), Some("http://pay.test"));
        assert!(!cfg.engine.require_auth);
        let creds = cfg.credentials.expect("credentials");
        assert_eq!(creds.api_key(), Some(("X-API-Key", "k")));
    }

    #[test]
    fn half_a_credential_pair_is_rejected() {
        let args = parse(&["--api-username", "alice"]);
        assert!(matches!(
            AdapterConfig::resolve(args, Vec::new()),
            Err(AdapterError::Config(_))
        ));
        assert!(parse_key_val("novalue").is_err());
    }
}
