use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use stage_predictor::{app, config::AppConfig, model::ModelState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env()?;

    // Loaded exactly once; a failure leaves the server up in degraded mode
    let model = Arc::new(ModelState::load(&cfg));
    if !model.is_ready() {
        tracing::warn!(
            "serving without a model (pipeline={}, encoders={}); restart after fixing the artifacts",
            cfg.model_path.display(),
            cfg.encoders_path.display()
        );
    }

    let app = app::router(model, &cfg);

    tracing::info!("listening on {}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
