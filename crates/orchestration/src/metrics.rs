use prometheus::{IntCounter, Registry};

/// Engine counters, registered against a caller-provided registry.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub deploys_dispatched: IntCounter,
    pub deploys_finalized: IntCounter,
    pub steps_verified: IntCounter,
    pub steps_failed: IntCounter,
}

impl EngineMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self {
            deploys_dispatched: IntCounter::new(
                "chainload_deploys_dispatched_total",
                "Deploys accepted by a node",
            )?,
            deploys_finalized: IntCounter::new(
                "chainload_deploys_finalized_total",
                "Run deploys observed finalized",
            )?,
            steps_verified: IntCounter::new(
                "chainload_steps_verified_total",
                "Steps that passed verification",
            )?,
            steps_failed: IntCounter::new("chainload_steps_failed_total", "Steps that failed")?,
        };
        registry.register(Box::new(metrics.deploys_dispatched.clone()))?;
        registry.register(Box::new(metrics.deploys_finalized.clone()))?;
        registry.register(Box::new(metrics.steps_verified.clone()))?;
        registry.register(Box::new(metrics.steps_failed.clone()))?;
        Ok(metrics)
    }
}
