//! Wire types for node RPC communication.

use chainload_core::{DeployInfo, DeployRequest};
use chainload_types::Motes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to submit a signed deploy.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitDeployRequest {
    pub deploy: DeployRequest,
    /// Content hash of `deploy`.
    pub hash: String,
    /// Hex ed25519 signature over the deploy's signing bytes.
    pub signature: String,
}

/// Response from deploy submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitDeployResponse {
    pub accepted: bool,
    #[serde(default)]
    pub deploy_hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response from the balance endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: Motes,
}

/// Response from the block endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockResponse {
    pub block_hash: String,
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub deploy_count: u32,
    pub proposer: String,
    #[serde(default)]
    pub finalized: bool,
}

/// Response from the block deploys endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockDeploysResponse {
    pub deploys: Vec<DeployInfo>,
}
