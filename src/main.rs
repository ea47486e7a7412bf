use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderflow_integrations::config::AppConfig;
use orderflow_integrations::{build_state, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "orderflow_integrations=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let enabled: Vec<&str> = config
        .enabled_connectors
        .iter()
        .map(|connector| connector.as_str())
        .collect();
    tracing::info!("Enabled accounting connectors: {}", enabled.join(", "));

    let app = create_app(build_state(&config), &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
    tracing::info!("Starting OrderFlow integrations server on http://{}", config.server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
