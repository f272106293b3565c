//! Resilience kernel: circuit breaker, retry driver, and dead-letter queue.
//!
//! Every outbound dependency call in the control plane is wrapped in a named
//! circuit breaker and optionally the retry driver; work that cannot be
//! delivered lands in the dead-letter queue for inspection or requeue.

pub mod circuit_breaker;
pub mod dlq;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats,
    StateChangeHook,
};
pub use dlq::{DeadLetterMessage, DeadLetterQueue, DlqStats};
pub use registry::BreakerRegistry;
pub use retry::{backoff_delay, retry_with_backoff, RetryConfig, RetryError};
