//! Workflow orchestration for chainload runs.
//!
//! A run executes a [`Generator`]: ordered phases of ordered steps. Each step
//! produces a [`WorkDescriptor`] whose items are executed by a bounded
//! [`WorkerPool`]. A step completes once every item resolved (on dispatch,
//! or on on-chain finalization reported by the monitoring layer) and its
//! verification passed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         WorkflowEngine (task)                        │
//! │   runs: RunIdentifier -> ActiveRun { cursor, StepProgress }          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │         │ Job                          ▲ WorkReport                  │
//! │         ▼                              │                             │
//! │   ┌───────────────────────────────────────────┐                      │
//! │   │ WorkerPool: bounded queue, N workers      │── submit ──▶ chain   │
//! │   │ actors::execute per WorkItem              │                      │
//! │   └───────────────────────────────────────────┘                      │
//! │                                                                      │
//! │   EngineHandle::verify_deploy ◀── monitoring (finalized deploys)     │
//! └──────────────────────────────────────────────────────────────────────┘
//!                 │ RunInfo / RunStep / RunLock / Deploy
//!                 ▼
//!            chainload-cache
//! ```

mod actors;
mod config;
mod context;
mod engine;
mod error;
mod metrics;
mod pool;
mod state;
mod step;
pub mod verification;
mod work;

pub use actors::{execute, Job};
pub use config::{EngineConfig, RetryPolicy};
pub use context::OrchestrationContext;
pub use engine::{EngineEvent, EngineHandle, RunOutcome, StartOutcome, WorkflowEngine};
pub use error::{OrchestrationError, VerificationError};
pub use metrics::EngineMetrics;
pub use pool::{PoolStats, WorkReport, WorkerPool};
pub use state::{StepProgress, StepSignal};
pub use step::{Completion, Generator, GeneratorRegistry, Phase, Step, WorkDescriptor};
pub use work::{WorkItem, WorkOutcome, NETWORK_FAUCET_INDEX};
