//! Graceful-shutdown plumbing shared by the service binaries.
//!
//! On the first SIGINT/SIGTERM the binary stops accepting new requests,
//! cancels the root token for background workers, then drains in-flight
//! work with a bounded budget.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Budget for in-flight work after the termination signal.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Completes on the first termination signal (SIGINT, or SIGTERM on unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Cancels `root` and waits up to [`DRAIN_TIMEOUT`] for `drained` to
/// complete. Returns false when the budget expired first.
pub async fn cancel_and_drain<F>(root: &CancellationToken, drained: F) -> bool
where
    F: std::future::Future<Output = ()>,
{
    root.cancel();
    tokio::time::timeout(DRAIN_TIMEOUT, drained).await.is_ok()
}
