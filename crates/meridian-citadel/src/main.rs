//! Citadel service binary: pipeline-event intake plus a small inspection
//! surface.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use meridian_citadel::CitadelMonitor;
use meridian_core::api::request_id_middleware;
use meridian_core::shutdown::{cancel_and_drain, shutdown_signal};
use meridian_core::{Config, EventBus, InMemoryBus, PIPELINE_STAGES_TOPIC};
use meridian_resilience::DeadLetterQueue;

#[derive(Clone)]
struct CitadelState {
    monitor: Arc<CitadelMonitor>,
    dlq: Arc<DeadLetterQueue>,
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "citadel"}))
}

async fn tallies(State(state): State<CitadelState>) -> Json<Value> {
    let tallies = state.monitor.tallies();
    Json(json!({"data": tallies, "total": tallies.len()}))
}

async fn dlq_stats(State(state): State<CitadelState>) -> Json<Value> {
    Json(serde_json::to_value(state.dlq.stats()).unwrap_or_else(|_| json!({})))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env(8200);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.default_log_filter())),
        )
        .init();

    let dlq = Arc::new(DeadLetterQueue::new());
    let monitor = Arc::new(CitadelMonitor::new(dlq.clone()));

    // In-memory bus stands in for the brokered stream; the consumer only
    // sees the port.
    let bus: Arc<InMemoryBus> = Arc::new(InMemoryBus::new());
    let root = CancellationToken::new();
    let consumer = {
        let monitor = monitor.clone();
        let rx = bus.subscribe(PIPELINE_STAGES_TOPIC);
        let token = root.child_token();
        tokio::spawn(async move { monitor.consume(rx, token).await })
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/mesh/tallies", get(tallies))
        .route("/api/v1/mesh/dlq", get(dlq_stats))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(CitadelState { monitor, dlq });

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    if !cfg.env.is_production() {
        tracing::info!(port = cfg.port, env = cfg.env.as_str(), "meridian citadel listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    tracing::info!("shutting down citadel");
    let drained = cancel_and_drain(&root, async {
        let _ = consumer.await;
    })
    .await;
    if !drained {
        tracing::warn!("citadel consumer did not drain within the shutdown budget");
    }
    tracing::info!("citadel stopped");
    Ok(())
}
