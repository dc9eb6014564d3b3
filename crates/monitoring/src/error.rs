use chainload_cache::CacheError;
use chainload_core::ClientError;
use chainload_orchestration::OrchestrationError;
use thiserror::Error;

/// Errors raised while consuming node event streams.
#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Chain client error: {0}")]
    Client(#[from] ClientError),

    #[error("Engine error: {0}")]
    Engine(#[from] OrchestrationError),

    #[error("Event {event_id} carries no {what}")]
    MissingField { event_id: u64, what: &'static str },
}
