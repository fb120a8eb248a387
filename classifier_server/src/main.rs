use anyhow::{Context, Result};
use classifier_server::{router, AppState, Artifacts};
use common::ServerConfig;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("classifier_server=info,tower_http=info")),
        )
        .init();

    info!("======================================================================");
    info!("Obesity Classification API - Starting");
    info!("======================================================================");

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    info!("Model: {}", config.artifacts.model.display());
    info!("Feature names: {}", config.artifacts.feature_names.display());
    info!("Label mapping: {}", config.artifacts.label_mapping.display());

    let artifacts = Artifacts::load(&config.artifacts, config.pool_size);
    if !artifacts.is_loaded() {
        warn!("Serving without a model; /predict will answer 500 until redeployed");
    }

    let state = Arc::new(AppState::new(artifacts));
    let app = router(state, &config.cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server ready on http://{}", config.bind_addr);
    info!("======================================================================");

    axum::serve(listener, app).await?;

    Ok(())
}
