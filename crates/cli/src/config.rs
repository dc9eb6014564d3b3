//! Network definition files.
//!
//! A network definition names the network, carries the faucet secret key and
//! lists the nodes to dispatch to:
//!
//! ```json
//! {
//!   "network": "lrt1",
//!   "faucet_private_key": "9f3c...",
//!   "nodes": [
//!     { "index": 1, "host": "10.0.0.11", "port_rpc": 7777, "port_event": 9999 },
//!     { "index": 2, "host": "10.0.0.12", "node_type": "READ_ONLY" }
//!   ]
//! }
//! ```

use chainload_cache::{Cache, CacheError};
use chainload_types::factory::{create_network, create_network_faucet, create_node};
use chainload_types::{Account, AccountType, FactoryError, KeyPair, NodeStatus, NodeType};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

const DEFAULT_PORT_RPC: u16 = 7777;
const DEFAULT_PORT_EVENT: u16 = 9999;
const DEFAULT_WEIGHT: u32 = 100;

/// Errors loading or registering a network definition.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read network file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed network file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Network file describes {found}, expected {expected}")]
    NetworkMismatch { expected: String, found: String },

    #[error("Invalid network definition: {0}")]
    Factory(#[from] FactoryError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// One node entry of a network definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub index: u32,
    pub host: String,
    #[serde(default = "default_port_rpc")]
    pub port_rpc: u16,
    #[serde(default = "default_port_event")]
    pub port_event: u16,
    #[serde(default = "default_status")]
    pub status: NodeStatus,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Secret key of the node's validator bonding account.
    #[serde(default)]
    pub validator_private_key: Option<String>,
}

fn default_port_rpc() -> u16 {
    DEFAULT_PORT_RPC
}

fn default_port_event() -> u16 {
    DEFAULT_PORT_EVENT
}

fn default_status() -> NodeStatus {
    NodeStatus::Healthy
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

/// Contents of a network definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFile {
    pub network: String,
    pub faucet_private_key: String,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

impl NetworkFile {
    /// Read a definition from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// A definition for an in-process chain with `nodes` healthy full nodes.
    pub fn simulated<R: RngCore + CryptoRng>(network: &str, nodes: u32, rng: &mut R) -> Self {
        let faucet = KeyPair::generate(rng);
        Self {
            network: network.to_string(),
            faucet_private_key: faucet.private_key,
            nodes: (1..=nodes)
                .map(|index| NodeEntry {
                    index,
                    host: "sim".to_string(),
                    port_rpc: 0,
                    port_event: 0,
                    status: NodeStatus::Healthy,
                    node_type: NodeType::Full,
                    weight: DEFAULT_WEIGHT,
                    validator_private_key: Some(KeyPair::generate(rng).private_key),
                })
                .collect(),
        }
    }

    /// Check the definition matches the network named on the command line.
    pub fn ensure_network(&self, expected: &str) -> Result<(), ConfigError> {
        if self.network != expected {
            return Err(ConfigError::NetworkMismatch {
                expected: expected.to_string(),
                found: self.network.clone(),
            });
        }
        Ok(())
    }

    /// Write the network, its faucet and its nodes into the cache.
    ///
    /// Returns the network faucet account.
    pub fn register(&self, cache: &Cache) -> Result<Account, ConfigError> {
        let key_pair = KeyPair::from_private_hex(&self.faucet_private_key)?;
        let faucet = create_network_faucet(&self.network, key_pair)?;
        cache.set_network(&create_network(&self.network, Some(faucet.clone()))?)?;

        for entry in &self.nodes {
            let mut node = create_node(
                &self.network,
                entry.index,
                entry.host.clone(),
                entry.port_rpc,
                entry.port_event,
                entry.status,
                entry.node_type,
                entry.weight,
            )?;
            if let Some(secret) = &entry.validator_private_key {
                let key_pair = KeyPair::from_private_hex(secret)?;
                node.account = Some(Account {
                    network: self.network.clone(),
                    run: None,
                    index: entry.index,
                    account_type: AccountType::ValidatorBond,
                    account_id: key_pair.account_id()?,
                    key_pair,
                    balance: 0,
                });
            }
            cache.set_node(&node)?;
        }

        info!(network = %self.network, nodes = self.nodes.len(), "Registered network");
        Ok(faucet)
    }
}
