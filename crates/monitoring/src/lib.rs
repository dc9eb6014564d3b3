//! Chain event monitoring for chainload.
//!
//! Listeners consume the event stream of every monitorable node and hand
//! each event to the shared [`EventCorrelator`]. The correlator routes events
//! by kind to [`EventHandler`]s, which tie deploys observed on chain back to
//! the runs that dispatched them and report them to the workflow engine.
//!
//! ```text
//!   node N-0001 ──stream──▶ NodeListener ─┐
//!   node N-0002 ──stream──▶ NodeListener ─┼─▶ EventCorrelator ─▶ handlers ─▶ cache
//!   node N-0003 ──stream──▶ NodeListener ─┘                          │
//!                                                                    ▼
//!                                                         EngineHandle::verify_deploy
//! ```
//!
//! The same event usually arrives from several nodes. Handlers claim an
//! event in the MONITORING partition before acting on it, so each deploy is
//! correlated once.

mod correlator;
mod error;
mod handlers;
mod listener;
mod metrics;

pub use correlator::{event_info, EventCorrelator};
pub use error::MonitoringError;
pub use handlers::{
    BlockFinalizedHandler, DeployDiscardedHandler, DeployFinalizedHandler, DeployOrphanedHandler,
    DeployProcessedHandler, EventHandler, MonitorContext,
};
pub use listener::{ListenerConfig, Monitor};
pub use metrics::CorrelatorMetrics;
