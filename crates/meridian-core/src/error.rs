//! Control-plane error kinds.
//!
//! One enum per failure class crossing a component boundary. Transient
//! errors are eligible for the retry driver; Fatal marks a violated
//! invariant and is never auto-recovered.

/// Error kinds shared by every core component.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed request body or missing required field. 400 at the edge.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing, malformed, or expired credentials. 401 at the edge.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Tenant mismatch or insufficient role. 403 at the edge.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown identifier. 404 at the edge.
    #[error("not found: {0}")]
    NotFound(String),

    /// A protected dependency is currently failing. 503 at the edge.
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    /// The ambient cancellation signal fired. Never retried.
    #[error("operation cancelled")]
    Cancelled,

    /// Upstream failure eligible for the retry driver.
    #[error("transient: {0}")]
    Transient(String),

    /// A programming invariant was violated. Logged and surfaced, never
    /// auto-recovered.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// True when the retry driver may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(CoreError::Transient("upstream 502".into()).is_retryable());
        assert!(!CoreError::Cancelled.is_retryable());
        assert!(!CoreError::Fatal("chain mismatch".into()).is_retryable());
        assert!(!CoreError::NotFound("run-1".into()).is_retryable());
    }

    #[test]
    fn display_carries_the_detail() {
        let err = CoreError::CircuitOpen("vault".into());
        assert_eq!(err.to_string(), "circuit breaker 'vault' is open");
    }
}
