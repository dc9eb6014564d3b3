//! Status and type enumerations shared across the domain model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Network flavour, the textual prefix of a network name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkType {
    /// Developer network.
    Dev,
    /// Local network.
    Loc,
    /// Long running test network.
    Lrt,
    /// Site reliability network.
    Sre,
    /// Staging network.
    Stg,
}

impl NetworkType {
    /// Lowercase prefix used in network names (e.g. `lrt` in `lrt1`).
    pub fn prefix(&self) -> &'static str {
        match self {
            NetworkType::Dev => "dev",
            NetworkType::Loc => "loc",
            NetworkType::Lrt => "lrt",
            NetworkType::Sre => "sre",
            NetworkType::Stg => "stg",
        }
    }

    /// Parse a network name prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "dev" => Some(NetworkType::Dev),
            "loc" => Some(NetworkType::Loc),
            "lrt" => Some(NetworkType::Lrt),
            "sre" => Some(NetworkType::Sre),
            "stg" => Some(NetworkType::Stg),
            _ => None,
        }
    }
}

/// Operational status of a registered network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkStatus {
    #[default]
    Unknown,
    Healthy,
    Distressed,
    Down,
}

/// Operational status of a node, refreshed by an external monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    Unknown,
    Healthy,
    Distressed,
    Down,
}

/// Degree of consensus participation of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    #[default]
    Full,
    ReadOnly,
}

/// Role an account plays within a network or a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// The network-wide faucet funding every run.
    NetworkFaucet,
    /// A run-level faucet funded from the network faucet.
    Faucet,
    /// A user account created for a run.
    User,
    /// An account holding a run's contracts.
    Contract,
    /// A validator bonding account.
    ValidatorBond,
}

/// Type of contract a deploy installs or invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    /// Native transfer, session code.
    TransferU512,
    /// Transfer via a previously stored contract.
    TransferU512Stored,
    /// Counter contract definition.
    CounterDefine,
    /// Delegation to a validator.
    Delegate,
}

impl ContractType {
    /// Canonical name used in cache keys.
    pub fn name(&self) -> &'static str {
        match self {
            ContractType::TransferU512 => "TRANSFER_U512",
            ContractType::TransferU512Stored => "TRANSFER_U512_STORED",
            ContractType::CounterDefine => "COUNTER_DEFINE",
            ContractType::Delegate => "DELEGATE",
        }
    }
}

/// Processing status of a dispatched deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    #[default]
    Dispatched,
    Added,
    Processed,
    Finalized,
    Discarded,
    Orphaned,
}

impl DeployStatus {
    /// Check if no further status change is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Finalized | DeployStatus::Discarded)
    }
}

/// The kind of work a deploy performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployType {
    Transfer,
    Refund,
    ContractInstall,
    Delegate,
}

/// Status of a block as reported by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStatus {
    #[default]
    Added,
    Finalized,
}

/// Lifecycle of a generator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
}

impl RunStatus {
    /// Check if the run has finished, successfully or not.
    pub fn is_final(&self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Complete => "COMPLETE",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Lifecycle of a single run step as persisted in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStepStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
}
