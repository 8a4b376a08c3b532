// DocFlow feed server
// Decision: Configuration comes from the environment (.env honoured)

use anyhow::{Context, Result};
use docflow_feed_core::telemetry::{init_telemetry, TelemetryConfig};
use docflow_feed_server::{serve, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let mut telemetry_config = TelemetryConfig::from_env()
        .with_default_filter("docflow_feed_server=debug,tower_http=debug,info");
    if telemetry_config.service_name == "docflow" {
        telemetry_config.service_name = "docflow-feed-server".to_string();
    }
    init_telemetry(telemetry_config);

    let config = ServerConfig::from_env();
    let addr = config.bind_addr();
    tracing::info!(
        admin_roles = ?config.admin_roles,
        history_per_tenant = config.history_per_tenant,
        max_tenants = config.max_tenants,
        "docflow-feed-server starting..."
    );

    let state = AppState::new(config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("HTTP server listening on {}", addr);

    serve(listener, state).await.context("Server error")?;

    Ok(())
}
