//! Run-level orchestration records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{lock_label, loop_label, node_label, Motes, RunIdentifier, RunStatus, RunStepStatus};

/// Workload-specific parameters of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadArgs {
    /// Number of user accounts to create and fund.
    pub user_accounts: u32,
    /// Amount moved from the network faucet into the run faucet.
    pub faucet_initial_balance: Motes,
    /// Amount moved from the run faucet into the contract account.
    pub contract_initial_balance: Motes,
    /// Amount moved from the run faucet into each user account.
    pub user_initial_balance: Motes,
    /// Amount each user delegates.
    pub delegate_amount: Motes,
    /// Validator receiving delegations (node index).
    pub validator_index: u32,
}

impl Default for WorkloadArgs {
    fn default() -> Self {
        Self {
            user_accounts: 5,
            faucet_initial_balance: 100_000_000_000,
            contract_initial_balance: 10_000_000_000,
            user_initial_balance: 1_000_000_000,
            delegate_amount: 500_000_000,
            validator_index: 1,
        }
    }
}

/// Everything one run pass needs; immutable while the pass executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub run: RunIdentifier,
    /// Node to dispatch to; 0 selects a random operational node.
    pub node_index: u32,
    /// Number of passes; 0 runs once.
    pub loop_count: u32,
    /// Seconds between passes.
    pub loop_interval: u64,
    /// One-based index of the current pass.
    pub loop_index: u32,
    pub args: WorkloadArgs,
}

impl ExecutionContext {
    pub fn network(&self) -> &str {
        &self.run.network
    }

    pub fn run_type(&self) -> &str {
        &self.run.run_type
    }

    pub fn run_index(&self) -> u32 {
        self.run.run_index
    }

    /// Total passes this context asks for.
    pub fn total_passes(&self) -> u32 {
        self.loop_count.max(1)
    }

    /// Check if another pass follows the current one.
    pub fn has_next_pass(&self) -> bool {
        self.loop_index < self.total_passes()
    }

    /// Context for the following pass.
    pub fn next_pass(&self) -> Self {
        Self {
            loop_index: self.loop_index + 1,
            ..self.clone()
        }
    }
}

/// Persisted lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run: RunIdentifier,
    pub status: RunStatus,
    pub node_index: u32,
    pub loop_index: u32,
    pub loop_count: u32,
    pub args: WorkloadArgs,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Failure reason, if the run failed.
    pub reason: Option<String>,
}

/// Persisted lifecycle of one step within a run pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStep {
    pub run: RunIdentifier,
    pub loop_index: u32,
    /// `{phase}.{action}` label.
    pub label: String,
    pub status: RunStepStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl RunStep {
    pub fn loop_label(&self) -> String {
        loop_label(self.loop_index)
    }
}

/// A held slot of a run's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLock {
    pub run: RunIdentifier,
    pub lock_index: u32,
}

impl RunLock {
    pub fn new(run: RunIdentifier) -> Self {
        Self { run, lock_index: 1 }
    }

    pub fn label(&self) -> String {
        lock_label(self.lock_index)
    }
}

/// A held slot binding a listener to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMonitoringLock {
    pub network: String,
    pub node_index: u32,
    pub lock_index: u32,
}

impl NodeMonitoringLock {
    pub fn new(network: impl Into<String>, node_index: u32) -> Self {
        Self {
            network: network.into(),
            node_index,
            lock_index: 1,
        }
    }

    pub fn node_label(&self) -> String {
        node_label(self.node_index)
    }

    pub fn label(&self) -> String {
        lock_label(self.lock_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(loop_count: u32) -> ExecutionContext {
        ExecutionContext {
            run: RunIdentifier::new("lrt1", "WG-100", 1),
            node_index: 0,
            loop_count,
            loop_interval: 0,
            loop_index: 1,
            args: WorkloadArgs::default(),
        }
    }

    #[test]
    fn test_zero_loop_count_runs_once() {
        assert!(!ctx(0).has_next_pass());
        assert!(!ctx(1).has_next_pass());
    }

    #[test]
    fn test_loop_passes() {
        let mut c = ctx(3);
        let mut passes = 1;
        while c.has_next_pass() {
            c = c.next_pass();
            passes += 1;
        }
        assert_eq!(passes, 3);
        assert_eq!(c.loop_index, 3);
    }
}
