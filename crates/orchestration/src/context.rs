use chainload_cache::Cache;
use chainload_core::ChainClient;
use std::sync::Arc;

use crate::{EngineConfig, EngineMetrics};

/// Process-wide collaborators handed to the engine, workers and steps.
///
/// Built once at startup; clones share the same cache, client and metrics.
#[derive(Clone)]
pub struct OrchestrationContext {
    pub cache: Cache,
    pub client: Arc<dyn ChainClient>,
    pub config: EngineConfig,
    pub metrics: Option<Arc<EngineMetrics>>,
}

impl std::fmt::Debug for OrchestrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrchestrationContext {
    pub fn new(cache: Cache, client: Arc<dyn ChainClient>, config: EngineConfig) -> Self {
        Self {
            cache,
            client,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn record<F: FnOnce(&EngineMetrics)>(&self, f: F) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}
