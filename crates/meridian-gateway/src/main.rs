//! Gateway service binary.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use meridian_core::shutdown::shutdown_signal;
use meridian_core::Config;
use meridian_gateway::{build_router, GatewayState};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env(8000);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.default_log_filter())),
        )
        .init();

    let root = CancellationToken::new();
    let state = GatewayState::build(cfg.clone(), root.child_token())
        .context("gateway state wiring failed")?;
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    if !cfg.env.is_production() {
        tracing::info!(
            port = cfg.port,
            env = cfg.env.as_str(),
            cors_origins = cfg.cors_origins.len(),
            "meridian gateway listening"
        );
    }

    // Stops accepting on the first termination signal, finishes in-flight
    // requests, then cancels the ambient token for background runs.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    tracing::info!("shutting down gateway");
    root.cancel();
    tracing::info!("gateway stopped");
    Ok(())
}
