//! Vault service binary: ledger + rationale HTTP surface and the pipeline
//! anchor consumer.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use meridian_core::shutdown::{cancel_and_drain, shutdown_signal};
use meridian_core::{Config, EventBus, InMemoryBus, PIPELINE_STAGES_TOPIC};
use meridian_vault::{
    build_router, run_pipeline_anchor, Ed25519Signer, Ledger, RationaleStore, VaultState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env(8300);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.default_log_filter())),
        )
        .init();

    let signer = match &cfg.ledger_seed {
        Some(seed) => Ed25519Signer::from_seed_hex(seed).context("invalid LEDGER_SEED")?,
        None => Ed25519Signer::generate(),
    };
    let ledger = Arc::new(Ledger::new(signer.clone()).context("ledger genesis failed")?);
    let rationales = Arc::new(RationaleStore::new(signer, ledger.clone()));

    // In-memory bus stands in for the brokered stream; the anchor consumer
    // only sees the port.
    let bus: Arc<InMemoryBus> = Arc::new(InMemoryBus::new());
    let root = CancellationToken::new();
    let anchor = tokio::spawn(run_pipeline_anchor(
        bus.subscribe(PIPELINE_STAGES_TOPIC),
        ledger.clone(),
        root.child_token(),
    ));

    let app = build_router(VaultState {
        ledger: ledger.clone(),
        rationales,
    });

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    if !cfg.env.is_production() {
        tracing::info!(
            port = cfg.port,
            env = cfg.env.as_str(),
            public_key = %ledger.public_key_hex(),
            "meridian vault listening"
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    tracing::info!("shutting down vault");
    let drained = cancel_and_drain(&root, async {
        let _ = anchor.await;
    })
    .await;
    if !drained {
        tracing::warn!("anchor consumer did not drain within the shutdown budget");
    }
    tracing::info!("vault stopped");
    Ok(())
}
