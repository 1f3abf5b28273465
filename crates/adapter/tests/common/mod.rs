use anyhow::Context as _;
use std::path::Path;
use std::process::{Child, Command};
use std::time::Duration;

pub use toolbridge_test_support::{KillOnDrop, MockUpstream};

/// Variables the adapter reads; cleared so the host environment cannot leak into a test.
const ADAPTER_ENV: &[&str] = &[
    "TOOLBRIDGE_CONFIG",
    "MCP_HOST",
    "MCP_PORT",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "OPENAPI_DIR",
    "FORCE_BASE_URL",
    "MOCK_ALL",
    "MOCK_API_BASE_URL",
    "AUTO_MOCK_FALLBACK",
    "FALLBACK_BASE_URL",
    "REQUEST_TIMEOUT",
    "DEFAULT_LOGIN_URL",
    "SESSION_COOKIE_NAME",
    "TOKEN_CACHE_PATH",
    "REQUIRE_AUTH",
    "API_USERNAME",
    "API_PASSWORD",
    "API_KEY_NAME",
    "API_KEY_VALUE",
    "LOGIN_URL",
];

pub fn pick_unused_port() -> anyhow::Result<u16> {
    toolbridge_test_support::pick_unused_port()
}

pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    toolbridge_test_support::wait_http_ok(url, timeout_dur).await
}

pub fn spawn_adapter(
    config_path: &Path,
    port: u16,
    env: &[(&str, &str)],
) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_toolbridge-adapter");
    let mut cmd = Command::new(bin);
    for key in ADAPTER_ENV {
        cmd.env_remove(key);
    }
    cmd.envs(env.iter().copied())
        .arg("--config")
        .arg(config_path)
        .arg("--port")
        .arg(port.to_string())
        .arg("--log-level")
        .arg("info")
        .spawn()
        .context("spawn adapter")
}
