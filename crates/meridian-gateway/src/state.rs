//! Gateway state wiring: orchestrator, resilience kernel, bus, and tenant
//! key derivation assembled behind one cloneable handle.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use meridian_core::{Config, CoreError, EventBus, InMemoryBus, PIPELINE_STAGES_TOPIC};
use meridian_pipeline::{Orchestrator, SimulatedStages, StageExecutor};
use meridian_resilience::{BreakerRegistry, DeadLetterQueue};

use crate::tenant_keys::TenantKeyDeriver;

/// Downstream dependencies each guarded by a named breaker.
pub const OUTBOUND_DEPENDENCIES: [&str; 5] = ["cognitive", "citadel", "vault", "parser", "audit"];

#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub orchestrator: Orchestrator,
    pub breakers: Arc<BreakerRegistry>,
    pub dlq: Arc<DeadLetterQueue>,
    pub bus: Arc<InMemoryBus>,
    pub tenant_keys: Arc<TenantKeyDeriver>,
}

impl GatewayState {
    /// Assembles the gateway over the built-in simulated stages.
    pub fn build(config: Config, cancel: CancellationToken) -> Result<Self, CoreError> {
        Self::build_with_executor(config, cancel, Arc::new(SimulatedStages::new()))
    }

    /// Assembles the gateway with an explicit stage executor.
    pub fn build_with_executor(
        config: Config,
        cancel: CancellationToken,
        executor: Arc<dyn StageExecutor>,
    ) -> Result<Self, CoreError> {
        let bus = Arc::new(InMemoryBus::new());
        let orchestrator = Orchestrator::new(executor, cancel);

        // Every stage event goes onto the bus; the citadel and the vault
        // consume from there.
        let publisher = bus.clone();
        orchestrator.on_stage_complete(Arc::new(move |run, result| {
            let payload = json!({"run": run, "result": result});
            if let Err(err) = publisher.publish(PIPELINE_STAGES_TOPIC, payload) {
                tracing::warn!(error = %err, "failed to publish stage event");
            }
        }));

        let breakers = Arc::new(BreakerRegistry::new());
        for dependency in OUTBOUND_DEPENDENCIES {
            breakers.get_or_create(dependency);
        }

        let tenant_keys = match &config.tenant_master_key {
            Some(master_hex) => TenantKeyDeriver::from_hex(master_hex)?,
            None => TenantKeyDeriver::generate(),
        };

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            breakers,
            dlq: Arc::new(DeadLetterQueue::new()),
            bus,
            tenant_keys: Arc::new(tenant_keys),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::BusReceiver;

    #[tokio::test]
    async fn build_registers_the_outbound_breakers() {
        let state = GatewayState::build(Config::from_env(0), CancellationToken::new()).unwrap();
        let stats = state.breakers.stats();
        assert_eq!(stats.len(), OUTBOUND_DEPENDENCIES.len());
    }

    #[tokio::test]
    async fn stage_events_reach_the_bus() {
        let state = GatewayState::build(Config::from_env(0), CancellationToken::new()).unwrap();
        let mut rx: BusReceiver = state.bus.subscribe(PIPELINE_STAGES_TOPIC);

        let run = state
            .orchestrator
            .start("repo-1", "org-1", None, "main")
            .await;

        let cancel = CancellationToken::new();
        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), rx.read(&cancel))
            .await
            .expect("first stage event within budget")
            .unwrap();
        assert_eq!(msg.payload["run"]["id"], run.id.as_str());
        assert_eq!(msg.payload["result"]["stage"], "upload");
    }
}
