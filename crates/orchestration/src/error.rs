use chainload_cache::CacheError;
use chainload_core::ClientError;
use chainload_types::{FactoryError, Motes};
use thiserror::Error;

/// Failed expectation about the effects of a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Deploy {0} is not finalized")]
    NotFinalized(String),

    #[error("Deploy {0} was discarded by the chain")]
    Discarded(String),

    #[error("Deploy {deploy_hash} finalized in {latency_ms}ms, tolerance {tolerance_ms}ms")]
    TooSlow {
        deploy_hash: String,
        latency_ms: i64,
        tolerance_ms: i64,
    },

    #[error("Step {step}: expected {expected} finalized deploys, found {actual}")]
    DeployCount {
        step: String,
        expected: usize,
        actual: usize,
    },

    #[error("Expected {expected} accounts, found {actual}")]
    AccountCount { expected: usize, actual: usize },

    #[error("Account {account}: expected balance {expected}, found {actual}")]
    Balance {
        account: String,
        expected: Motes,
        actual: Motes,
    },

    #[error("Account {account}: {balance} left on chain, at most {allowed} expected")]
    Unreturned {
        account: String,
        balance: Motes,
        allowed: Motes,
    },

    #[error("Account {account}: expected at least {minimum}, found {actual}")]
    Shortfall {
        account: String,
        minimum: Motes,
        actual: Motes,
    },

    #[error("Transfer for deploy {0} not recorded")]
    MissingTransfer(String),

    #[error("Verification lookup failed: {0}")]
    Lookup(String),
}

impl From<CacheError> for VerificationError {
    fn from(err: CacheError) -> Self {
        VerificationError::Lookup(err.to_string())
    }
}

/// Errors raised while orchestrating runs.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Chain client error: {0}")]
    Client(#[from] ClientError),

    #[error("Factory error: {0}")]
    Factory(#[from] FactoryError),

    #[error("No operational nodes in network {0}")]
    EmptyNodeSet(String),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Unknown generator: {0}")]
    UnknownGenerator(String),

    #[error("Submission failed after {attempts} attempts: {last}")]
    SubmissionExhausted { attempts: u32, last: ClientError },

    #[error("Workflow engine stopped")]
    EngineStopped,
}
