use anyhow::Context as _;
use clap::Parser as _;
use std::sync::Arc;
use toolbridge_adapter::{AdapterConfig, AdapterError, AppState, Args, LogFormat, router};
use toolbridge_openapi_tools::ToolService;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str, format: LogFormat) -> toolbridge_adapter::Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| AdapterError::Config(format!("invalid log level '{level}': {e}")))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| AdapterError::Startup(format!("install tracing subscriber: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AdapterConfig::resolve(Args::parse(), std::env::vars())
        .context("resolve configuration")?;
    init_tracing(&config.log_level, config.log_format)?;

    let bind = config.bind_addr();
    let service = Arc::new(ToolService::new(config.engine));
    if let Some(credentials) = config.credentials {
        info!(username = %credentials.username, "installing initial credentials");
        service.set_credentials(credentials);
    }

    let registry = service.registry();
    let app = router(AppState {
        service: Arc::clone(&service),
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(
        bind = %bind,
        specs = registry.spec_count(),
        tools = registry.tool_count(),
        "toolbridge-adapter listening"
    );
    drop(registry);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")
}
