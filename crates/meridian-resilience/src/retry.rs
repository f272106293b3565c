//! Exponential-backoff retry driver with jitter and cancellation.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Backoff schedule configuration. `jitter_factor` must lie in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.3,
        }
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The ambient cancellation signal fired; the operation was not
    /// re-invoked.
    #[error("operation cancelled")]
    Cancelled,
    /// Every attempt failed; carries the last error.
    #[error("{0}")]
    Exhausted(E),
}

/// Delay before re-attempt `attempt` (0-indexed): exponential growth capped
/// at `max_delay`, perturbed by uniform jitter; a negative perturbed delay
/// clamps up to `initial_delay`.
pub fn backoff_delay(attempt: u32, cfg: &RetryConfig) -> Duration {
    let mut delay = cfg.initial_delay.as_secs_f64() * cfg.multiplier.powi(attempt as i32);
    let max = cfg.max_delay.as_secs_f64();
    if delay > max {
        delay = max;
    }
    if cfg.jitter_factor > 0.0 {
        let jitter = delay * cfg.jitter_factor * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
        delay += jitter;
    }
    if delay < 0.0 {
        delay = cfg.initial_delay.as_secs_f64();
    }
    Duration::from_secs_f64(delay)
}

/// Drives `op` up to `cfg.max_attempts` times, sleeping the backoff schedule
/// between attempts. The inter-attempt wait races the cancellation token;
/// cancellation returns immediately without invoking `op` again.
pub async fn retry_with_backoff<T, E, F, Fut>(
    cancel: &CancellationToken,
    cfg: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err: Option<E> = None;

    for attempt in 0..cfg.max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation, attempt = attempt + 1, "retry succeeded");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt + 1 < cfg.max_attempts {
                    let delay = backoff_delay(attempt, cfg);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = cfg.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "operation failed, retrying"
                    );
                    last_err = Some(err);

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                } else {
                    last_err = Some(err);
                }
            }
        }
    }

    // max_attempts >= 1 guarantees at least one recorded error here; an
    // all-zero budget degenerates to an immediate cancellation-style exit.
    match last_err {
        Some(err) => {
            tracing::error!(
                operation,
                attempts = cfg.max_attempts,
                error = %err,
                "all retry attempts exhausted"
            );
            Err(RetryError::Exhausted(err))
        }
        None => Err(RetryError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn zero_jitter(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(80),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn zero_jitter_schedule_is_deterministic_and_capped() {
        let cfg = zero_jitter(6);
        let delays: Vec<u64> = (0..5)
            .map(|k| backoff_delay(k, &cfg).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 80]);
    }

    #[test]
    fn jitter_stays_within_the_configured_band() {
        let cfg = RetryConfig {
            jitter_factor: 0.3,
            ..zero_jitter(3)
        };
        for _ in 0..100 {
            let d = backoff_delay(0, &cfg).as_secs_f64();
            assert!((0.007..=0.013).contains(&d), "delay out of band: {d}");
        }
    }

    #[tokio::test]
    async fn returns_first_success() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = retry_with_backoff(&cancel, &zero_jitter(5), "flaky", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_the_attempt_budget() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = retry_with_backoff(&cancel, &zero_jitter(4), "down", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("upstream 502")
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::Exhausted("upstream 502")));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_stops_immediately() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let cfg = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            ..RetryConfig::default()
        };

        let inner = cancel.clone();
        let err = retry_with_backoff(&cancel, &cfg, "cancelled", move || {
            let counter = counter.clone();
            let inner = inner.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // Fail once, then fire the ambient signal mid-backoff.
                inner.cancel();
                Err::<(), _>("first failure")
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
