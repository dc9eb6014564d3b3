//! Domain model for chainload workload runs.
//!
//! This crate provides the typed entities every other crate passes around:
//!
//! - Infrastructure: [`Network`], [`Node`] and their identifiers
//! - Chain state: [`Account`], [`Deploy`], [`Transfer`], [`Block`], [`NamedKey`]
//! - Orchestration: [`ExecutionContext`], [`RunInfo`], [`RunStep`] and the lock records
//!
//! Entities are plain data. Construction goes through the [`factory`] module
//! so that identity rules (index labels, run ownership) live in one place.

pub mod crypto;
mod enums;
mod error;
pub mod factory;
mod identifiers;
mod infra;
mod chain;
mod orchestration;

pub use chain::{Account, Block, Deploy, NamedKey, Transfer};
pub use crypto::KeyPair;
pub use enums::{
    AccountType, BlockStatus, ContractType, DeployStatus, DeployType, NetworkStatus, NetworkType,
    NodeStatus, NodeType, RunStatus, RunStepStatus,
};
pub use error::FactoryError;
pub use identifiers::{
    account_label, event_label, lock_label, loop_label, node_label, run_label, NetworkIdentifier,
    NodeIdentifier, RunIdentifier,
};
pub use infra::{Network, Node, NodeEventInfo};
pub use orchestration::{ExecutionContext, NodeMonitoringLock, RunInfo, RunLock, RunStep, WorkloadArgs};

/// Balances and amounts are expressed in the chain's smallest unit (motes).
pub type Motes = u64;
