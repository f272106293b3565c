//! Named breaker registry: one breaker per logical outbound dependency.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStats};

/// Holds one [`CircuitBreaker`] per dependency name, created on first use.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker for `name`, creating it with default
    /// configuration when absent.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());
            if let Some(breaker) = breakers.get(name) {
                return breaker.clone();
            }
        }
        let mut breakers = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(CircuitBreakerConfig::new(name))))
            .clone()
    }

    /// Registers a breaker with explicit configuration, replacing any
    /// breaker previously registered under the same name.
    pub fn register(&self, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let name = config.name.clone();
        let breaker = Arc::new(CircuitBreaker::new(config));
        let mut breakers = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        breakers.insert(name, breaker.clone());
        breaker
    }

    /// Snapshot of every registered breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitStats> {
        let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());
        let mut stats: Vec<CircuitStats> = breakers.values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}
