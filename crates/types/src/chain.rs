//! Chain state tracked for a run: accounts, deploys, transfers, blocks and
//! installed contract handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    account_label, AccountType, BlockStatus, ContractType, DeployStatus, DeployType, KeyPair,
    Motes, RunIdentifier,
};

/// An on-chain account owned either by a network (faucet) or a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub network: String,
    /// Owning run. `None` for network-level accounts.
    pub run: Option<RunIdentifier>,
    /// Index within the owner.
    pub index: u32,
    pub account_type: AccountType,
    pub key_pair: KeyPair,
    /// Hex blake2b-256 digest of the public key.
    pub account_id: String,
    /// Balance as tracked by the harness, not queried from chain.
    pub balance: Motes,
}

impl Account {
    pub fn label(&self) -> String {
        account_label(self.index)
    }

    pub fn is_run_account(&self) -> bool {
        self.run.is_some()
    }
}

/// A submitted, chain-tracked transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    pub network: String,
    pub run: RunIdentifier,
    /// Index of the dispatching account within the run.
    pub account_index: u32,
    pub deploy_hash: String,
    pub deploy_type: DeployType,
    /// Stored contract the deploy calls, if any.
    #[serde(default)]
    pub contract_hash: Option<String>,
    /// Node the deploy was submitted to.
    pub dispatch_node: u32,
    pub dispatch_timestamp: DateTime<Utc>,
    pub status: DeployStatus,
    /// Label of the step that dispatched the deploy, e.g. `phase-01.fund-users`.
    pub step_label: String,
    pub loop_index: u32,

    pub block_hash: Option<String>,
    pub block_rank: Option<u64>,
    pub finalization_timestamp: Option<DateTime<Utc>>,
    /// Node whose stream first reported finalization.
    pub finalization_node: Option<u32>,
    /// Dispatch to finalization latency in milliseconds.
    pub finalization_duration_ms: Option<i64>,
    /// Maximum acceptable latency in milliseconds.
    pub finalization_tolerance_ms: i64,
    pub finalization_is_acceptable: Option<bool>,
}

impl Deploy {
    /// Record finalization in `block`, as reported by `node_index`.
    ///
    /// Returns `false` without touching state if the deploy is already
    /// finalized in the same block; repeated reports from other streams are
    /// no-ops.
    pub fn update_on_finalization(&mut self, node_index: u32, block: &Block) -> bool {
        if self.status == DeployStatus::Finalized
            && self.block_hash.as_deref() == Some(block.block_hash.as_str())
        {
            return false;
        }

        let latency = (block.timestamp - self.dispatch_timestamp)
            .num_milliseconds()
            .max(0);

        self.status = DeployStatus::Finalized;
        self.block_hash = Some(block.block_hash.clone());
        self.block_rank = Some(block.rank);
        self.finalization_timestamp = Some(block.timestamp);
        self.finalization_node = Some(node_index);
        self.finalization_duration_ms = Some(latency);
        self.finalization_is_acceptable = Some(latency <= self.finalization_tolerance_ms);
        true
    }

    /// Apply a non-finalization status change. Finalized and discarded
    /// deploys keep their status.
    pub fn update_status(&mut self, status: DeployStatus) -> bool {
        if self.status.is_terminal() || self.status == status {
            return false;
        }
        self.status = status;
        true
    }
}

/// Value transfer carried by a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub network: String,
    pub run: RunIdentifier,
    pub deploy_hash: String,
    /// Index of the sending account.
    pub cp1_index: u32,
    /// Index of the receiving account.
    pub cp2_index: u32,
    pub amount: Motes,
    pub asset: String,
    /// Whether the amount should be returned to the faucet at run end.
    pub is_refundable: bool,
}

/// A block as reported by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub network: String,
    pub block_hash: String,
    /// Height of the block.
    pub rank: u64,
    pub timestamp: DateTime<Utc>,
    pub deploy_count: u32,
    /// Public key of the proposer.
    pub validator_id: String,
    pub status: BlockStatus,
}

/// Handle of a contract installed by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedKey {
    pub network: String,
    pub account_index: u32,
    pub contract_type: ContractType,
    pub name: String,
    pub hash: String,
}
