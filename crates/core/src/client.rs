//! Chain client contract.

use async_trait::async_trait;
use chainload_types::crypto::content_hash;
use chainload_types::{Account, Block, ContractType, KeyPair, Motes, NamedKey, Node};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EventEnvelope;

/// Errors returned by a chain client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Deploy rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Node unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    /// Check if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Http(_) | ClientError::Unavailable(_))
    }
}

/// Ordered stream of events from one node.
pub type EventStream = BoxStream<'static, Result<EventEnvelope, ClientError>>;

/// What a deploy does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeployPayload {
    /// Move `amount` to `target` (an account id), optionally via a stored contract.
    Transfer {
        target: String,
        amount: Motes,
        contract_hash: Option<String>,
    },
    /// Install a contract under the sender's account.
    InstallContract { contract_type: ContractType },
    /// Delegate `amount` to the validator with public key `validator`.
    Delegate { validator: String, amount: Motes },
}

impl DeployPayload {
    /// Stored contract the deploy calls, if any.
    pub fn contract_hash(&self) -> Option<&str> {
        match self {
            DeployPayload::Transfer { contract_hash, .. } => contract_hash.as_deref(),
            _ => None,
        }
    }
}

/// A deploy ready for signing and submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Account id of the sender.
    pub sender: String,
    /// Public key of the sender.
    pub sender_public_key: String,
    pub payload: DeployPayload,
    pub timestamp: DateTime<Utc>,
}

impl DeployRequest {
    pub fn new(sender: &Account, payload: DeployPayload) -> Self {
        Self {
            sender: sender.account_id.clone(),
            sender_public_key: sender.key_pair.public_key.clone(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Transfer `amount` from `from` to `to`, optionally through `contract`.
    pub fn transfer(from: &Account, to: &Account, amount: Motes, contract: Option<&NamedKey>) -> Self {
        Self::new(
            from,
            DeployPayload::Transfer {
                target: to.account_id.clone(),
                amount,
                contract_hash: contract.map(|c| c.hash.clone()),
            },
        )
    }

    /// Canonical bytes covered by the hash and signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Content hash identifying this deploy.
    pub fn hash(&self) -> String {
        content_hash(&self.signing_bytes())
    }

    /// Signature over [`Self::signing_bytes`].
    pub fn sign(&self, key_pair: &KeyPair) -> Result<String, ClientError> {
        key_pair
            .sign(&self.signing_bytes())
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// A deploy executed within a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployInfo {
    pub deploy_hash: String,
    /// Account id of the sender.
    pub sender: String,
    pub success: bool,
    pub cost: Motes,
}

/// Access to a chain node.
///
/// Implementations are shared across workers and listeners, so every method
/// takes `&self`.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Sign with `key_pair` and submit. Returns the deploy hash.
    async fn submit_deploy(
        &self,
        node: &Node,
        key_pair: &KeyPair,
        request: &DeployRequest,
    ) -> Result<String, ClientError>;

    /// Transfer `amount` from `from` to `to`, optionally through `contract`.
    async fn submit_transfer(
        &self,
        node: &Node,
        from: &Account,
        to: &Account,
        amount: Motes,
        contract: Option<&NamedKey>,
    ) -> Result<String, ClientError> {
        let request = DeployRequest::transfer(from, to, amount, contract);
        self.submit_deploy(node, &from.key_pair, &request).await
    }

    /// Balance of `account_id`; zero when the chain has no such account.
    async fn get_balance(&self, node: &Node, account_id: &str) -> Result<Motes, ClientError>;

    async fn get_block(&self, node: &Node, block_hash: &str) -> Result<Block, ClientError>;

    async fn get_deploys(
        &self,
        node: &Node,
        block_hash: &str,
    ) -> Result<Vec<DeployInfo>, ClientError>;

    /// Subscribe to the node's event stream. The stream ends on disconnect.
    async fn stream_events(&self, node: &Node) -> Result<EventStream, ClientError>;
}
