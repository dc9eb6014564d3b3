//! Routes chain events to registered handlers.

use chainload_core::{ChainEvent, EventEnvelope, EventKind};
use chainload_types::{Node, NodeEventInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::handlers::{
    BlockFinalizedHandler, DeployDiscardedHandler, DeployFinalizedHandler, DeployOrphanedHandler,
    DeployProcessedHandler, EventHandler, MonitorContext,
};
use crate::{CorrelatorMetrics, MonitoringError};

/// Per-network event correlator shared by the listeners of every node.
pub struct EventCorrelator {
    context: MonitorContext,
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
    metrics: Option<Arc<CorrelatorMetrics>>,
}

impl std::fmt::Debug for EventCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("EventCorrelator")
            .field("handlers", &kinds)
            .finish_non_exhaustive()
    }
}

impl EventCorrelator {
    /// A correlator with no handlers; every event is skipped.
    pub fn new(context: MonitorContext) -> Self {
        Self {
            context,
            handlers: HashMap::new(),
            metrics: None,
        }
    }

    /// A correlator with the standard deploy and block handlers.
    pub fn with_default_handlers(context: MonitorContext) -> Self {
        Self::new(context)
            .with_handler(EventKind::DeployFinalized, DeployFinalizedHandler)
            .with_handler(EventKind::DeployProcessed, DeployProcessedHandler)
            .with_handler(EventKind::DeployDiscarded, DeployDiscardedHandler)
            .with_handler(EventKind::DeployOrphaned, DeployOrphanedHandler)
            .with_handler(EventKind::BlockFinalized, BlockFinalizedHandler)
    }

    pub fn with_handler(mut self, kind: EventKind, handler: impl EventHandler + 'static) -> Self {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CorrelatorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn context(&self) -> &MonitorContext {
        &self.context
    }

    /// Handle one event read from `node`'s stream.
    pub async fn process(&self, node: &Node, envelope: &EventEnvelope) -> Result<(), MonitoringError> {
        self.record(|m| m.events_received.inc());

        let kind = match &envelope.event {
            ChainEvent::Unknown { kind } => {
                debug!(node = %node.label(), event_id = envelope.event_id, kind = %kind, "Skipping unrecognised event");
                self.record(|m| m.events_skipped.inc());
                return Ok(());
            }
            ChainEvent::BlockAdded { .. }
            | ChainEvent::BlockFinalized { .. }
            | ChainEvent::DeployAdded { .. }
            | ChainEvent::DeployDiscarded { .. }
            | ChainEvent::DeployFinalized { .. }
            | ChainEvent::DeployOrphaned { .. }
            | ChainEvent::DeployProcessed { .. }
            | ChainEvent::DeployRequeued { .. } => envelope.event.kind(),
        };

        let Some(handler) = self.handlers.get(&kind) else {
            trace!(node = %node.label(), event_id = envelope.event_id, kind = %kind, "No handler registered");
            self.record(|m| m.events_skipped.inc());
            return Ok(());
        };

        let info = event_info(node, envelope);
        let result = handler.handle(&self.context, node, envelope, &info).await;
        if let Err(e) = &result {
            warn!(node = %node.label(), event_id = envelope.event_id, kind = %kind, error = %e, "Event handler failed");
            self.record(|m| m.handler_errors.inc());
        }
        result
    }

    fn record<F: FnOnce(&CorrelatorMetrics)>(&self, f: F) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

/// Fields every handler needs, extracted once.
pub fn event_info(node: &Node, envelope: &EventEnvelope) -> NodeEventInfo {
    NodeEventInfo {
        network: node.network.clone(),
        node_index: node.index,
        event_id: envelope.event_id,
        event_type: envelope.event.type_name().to_string(),
        timestamp: envelope.timestamp,
        block_hash: envelope.event.block_hash().map(str::to_string),
        deploy_hash: envelope.event.deploy_hash().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainload_cache::Cache;
    use chainload_client::{SimulatedChain, SimulationConfig};
    use chainload_types::factory::create_node;
    use chainload_types::{NodeStatus, NodeType};
    use prometheus::Registry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(
            &self,
            _context: &MonitorContext,
            _node: &Node,
            _envelope: &EventEnvelope,
            info: &NodeEventInfo,
        ) -> Result<(), MonitoringError> {
            assert_eq!(info.event_type, "deploy_added");
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn node() -> Node {
        create_node("loc1", 1, "localhost", 1, 2, NodeStatus::Healthy, NodeType::Full, 1).unwrap()
    }

    fn context() -> MonitorContext {
        MonitorContext::new(Cache::in_memory(), SimulatedChain::new(SimulationConfig::default()))
    }

    #[tokio::test]
    async fn test_dispatches_by_kind_and_skips_the_rest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        let metrics = Arc::new(CorrelatorMetrics::register(&registry).unwrap());
        let correlator = EventCorrelator::new(context())
            .with_handler(EventKind::DeployAdded, Counting(Arc::clone(&calls)))
            .with_metrics(Arc::clone(&metrics));

        let added = EventEnvelope::new(1, ChainEvent::DeployAdded { deploy_hash: "d".into() });
        let requeued = EventEnvelope::new(2, ChainEvent::DeployRequeued { deploy_hash: "d".into() });
        let unknown = EventEnvelope::new(3, ChainEvent::Unknown { kind: "step".into() });
        for env in [&added, &requeued, &unknown] {
            correlator.process(&node(), env).await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.events_received.get(), 3);
        assert_eq!(metrics.events_skipped.get(), 2);
    }

    #[tokio::test]
    async fn test_foreign_deploys_are_ignored() {
        let correlator = EventCorrelator::with_default_handlers(context());
        let env = EventEnvelope::new(
            7,
            ChainEvent::DeployFinalized {
                block_hash: "b".into(),
                deploy_hash: "not-ours".into(),
            },
        );
        correlator.process(&node(), &env).await.unwrap();
        assert!(correlator
            .context()
            .cache
            .get_node_events("loc1", None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_event_info_extracts_hashes() {
        let env = EventEnvelope::new(
            9,
            ChainEvent::DeployProcessed {
                block_hash: "b".into(),
                deploy_hash: "d".into(),
            },
        );
        let info = event_info(&node(), &env);
        assert_eq!(info.event_id, 9);
        assert_eq!(info.node_index, 1);
        assert_eq!(info.event_type, "deploy_processed");
        assert_eq!(info.block_hash.as_deref(), Some("b"));
        assert_eq!(info.deploy_hash.as_deref(), Some("d"));
    }
}
