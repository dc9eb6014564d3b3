//! Units of work dispatched by steps and executed by workers.

use chainload_types::{AccountType, ContractType, DeployType, Motes};

/// Account index designating the network faucet.
pub const NETWORK_FAUCET_INDEX: u32 = 0;

/// One operation a worker performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Create a run account with a fresh key pair. Touches the cache only.
    CreateAccount {
        index: u32,
        account_type: AccountType,
    },

    /// Transfer a fixed amount between two accounts of the run.
    /// Index [`NETWORK_FAUCET_INDEX`] designates the network faucet.
    /// With `contract` set the transfer calls the sender's installed
    /// contract of that type.
    Transfer {
        from: u32,
        to: u32,
        amount: Motes,
        deploy_type: DeployType,
        is_refundable: bool,
        contract: Option<ContractType>,
    },

    /// Return the sender's on-chain balance, less the transaction fee.
    Refund {
        from: u32,
        to: u32,
        contract: Option<ContractType>,
    },

    /// Install a contract under an account.
    InstallContract {
        account_index: u32,
        contract_type: ContractType,
    },

    /// Delegate stake from an account to a validator node.
    Delegate {
        account_index: u32,
        validator_index: u32,
        amount: Motes,
    },
}

impl WorkItem {
    /// Get a human-readable name for this item type.
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkItem::CreateAccount { .. } => "CreateAccount",
            WorkItem::Transfer { .. } => "Transfer",
            WorkItem::Refund { .. } => "Refund",
            WorkItem::InstallContract { .. } => "InstallContract",
            WorkItem::Delegate { .. } => "Delegate",
        }
    }

    /// Check if this item submits a deploy.
    pub fn is_chain_operation(&self) -> bool {
        !matches!(self, WorkItem::CreateAccount { .. })
    }
}

/// What a worker reports back for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Completed; carries the deploy hash for chain operations.
    Done { deploy_hash: Option<String> },
    /// Deliberately not performed.
    Skipped { reason: String },
    /// Could not be performed.
    Failed { reason: String },
}
