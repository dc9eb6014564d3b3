use prometheus::{IntCounter, Registry};

/// Correlator counters.
#[derive(Debug, Clone)]
pub struct CorrelatorMetrics {
    pub events_received: IntCounter,
    pub events_skipped: IntCounter,
    pub handler_errors: IntCounter,
}

impl CorrelatorMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self {
            events_received: IntCounter::new(
                "chainload_events_received_total",
                "Events read from node streams",
            )?,
            events_skipped: IntCounter::new(
                "chainload_events_skipped_total",
                "Events with no registered handler",
            )?,
            handler_errors: IntCounter::new(
                "chainload_event_handler_errors_total",
                "Events whose handler failed",
            )?,
        };
        registry.register(Box::new(metrics.events_received.clone()))?;
        registry.register(Box::new(metrics.events_skipped.clone()))?;
        registry.register(Box::new(metrics.handler_errors.clone()))?;
        Ok(metrics)
    }
}
