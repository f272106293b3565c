//! Per-dependency circuit breaker.
//!
//! Three states: closed (calls flow), open (fail fast), half-open (bounded
//! probes). The state decision happens under the lock; the wrapped future is
//! never polled while the lock is held, and fail-fast never blocks the
//! caller.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an `execute` call.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker refused the call without invoking the operation.
    #[error("circuit breaker '{0}' is open")]
    Open(String),
    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Observer invoked on every state transition, outside the breaker lock.
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Breaker configuration. Zero-equivalent fields fall back to the defaults
/// (5 failures, 30 s reset, 3 half-open probes).
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub name: String,
    pub max_failures: u32,
    pub reset_timeout: Duration,
    pub half_open_max_calls: u32,
    pub on_state_change: Option<StateChangeHook>,
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
            on_state_change: None,
        }
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    pub fn with_half_open_max_calls(mut self, half_open_max_calls: u32) -> Self {
        self.half_open_max_calls = half_open_max_calls;
        self
    }

    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }
}

/// Point-in-time breaker statistics.
#[derive(Clone, Debug, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u64,
    pub max_failures: u32,
    pub reset_timeout_ms: u64,
}

struct BreakerInner {
    state: CircuitState,
    failures: u32,
    successes: u64,
    last_failure: Option<Instant>,
    half_open_calls: u32,
}

/// Circuit breaker guarding one named outbound dependency.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

type Transition = (CircuitState, CircuitState);

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
                half_open_calls: 0,
            }),
        }
    }

    /// Runs `op` through the breaker. In the open state the call returns
    /// `BreakerError::Open` immediately; in half-open only a bounded number
    /// of concurrent probes is admitted.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Open => {
                    let elapsed = inner
                        .last_failure
                        .map(|at| at.elapsed())
                        .unwrap_or(Duration::MAX);
                    if elapsed > self.config.reset_timeout {
                        let t = Self::transition(&mut inner, CircuitState::HalfOpen);
                        inner.half_open_calls += 1;
                        t
                    } else {
                        return Err(BreakerError::Open(self.config.name.clone()));
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_calls >= self.config.half_open_max_calls {
                        return Err(BreakerError::Open(self.config.name.clone()));
                    }
                    inner.half_open_calls += 1;
                    None
                }
                CircuitState::Closed => None,
            }
        };
        self.report(admission);

        let result = op().await;

        let settlement = {
            let mut inner = self.lock();
            match &result {
                Ok(_) => Self::on_success(&mut inner),
                Err(_) => self.on_failure(&mut inner),
            }
        };
        self.report(settlement);

        result.map_err(BreakerError::Inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.lock();
        CircuitStats {
            name: self.config.name.clone(),
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            max_failures: self.config.max_failures,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Every mutation completes within one critical section, so a
        // poisoned guard still holds a consistent state.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn on_success(inner: &mut BreakerInner) -> Option<Transition> {
        inner.failures = 0;
        inner.successes += 1;
        if inner.state == CircuitState::HalfOpen {
            return Self::transition(inner, CircuitState::Closed);
        }
        None
    }

    fn on_failure(&self, inner: &mut BreakerInner) -> Option<Transition> {
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());

        if inner.state == CircuitState::HalfOpen {
            return Self::transition(inner, CircuitState::Open);
        }
        if inner.failures >= self.config.max_failures {
            return Self::transition(inner, CircuitState::Open);
        }
        None
    }

    /// Applies a state change and resets the counters tied to it. Returns
    /// the transition for reporting once the lock is released.
    fn transition(inner: &mut BreakerInner, to: CircuitState) -> Option<Transition> {
        let from = inner.state;
        inner.state = to;
        inner.half_open_calls = 0;
        if to == CircuitState::Closed {
            inner.failures = 0;
            inner.successes = 0;
        }
        Some((from, to))
    }

    fn report(&self, transition: Option<Transition>) {
        if let Some((from, to)) = transition {
            tracing::info!(
                name = %self.config.name,
                from = %from,
                to = %to,
                "circuit breaker state change"
            );
            if let Some(hook) = &self.config.on_state_change {
                hook(&self.config.name, from, to);
            }
        }
    }
}
