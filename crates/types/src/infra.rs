//! Networks, nodes and node event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    node_label, Account, NetworkIdentifier, NetworkStatus, NetworkType, NodeIdentifier,
    NodeStatus, NodeType,
};

/// A registered test network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network name, e.g. `lrt1`.
    pub name: String,
    /// Numeric suffix of the name.
    pub index: u32,
    pub network_type: NetworkType,
    pub status: NetworkStatus,
    /// Network faucet, if registered.
    pub faucet: Option<Account>,
}

impl Network {
    pub fn identifier(&self) -> NetworkIdentifier {
        NetworkIdentifier::new(self.name.clone())
    }
}

/// A node of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub network: String,
    /// One-based index within the network.
    pub index: u32,
    pub host: String,
    pub port_rpc: u16,
    pub port_event: u16,
    pub status: NodeStatus,
    pub node_type: NodeType,
    /// Relative weight for selection.
    pub weight: u32,
    /// Validator bonding account, if any.
    pub account: Option<Account>,
}

impl Node {
    pub fn identifier(&self) -> NodeIdentifier {
        NodeIdentifier {
            network: NetworkIdentifier::new(self.network.clone()),
            index: self.index,
        }
    }

    pub fn label(&self) -> String {
        node_label(self.index)
    }

    /// Base URL of the node's JSON-RPC endpoint.
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port_rpc)
    }

    /// Base URL of the node's event stream endpoint.
    pub fn event_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port_event)
    }

    /// Check if deploys may be sent to this node.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self.status, NodeStatus::Healthy | NodeStatus::Distressed)
    }

    /// Check if state queries may be sent to this node.
    pub fn is_queryable(&self) -> bool {
        self.is_dispatchable()
    }

    /// Check if the node's event stream should be consumed.
    pub fn is_monitorable(&self) -> bool {
        self.is_dispatchable() && self.node_type == NodeType::Full
    }

    pub fn is_operational(&self) -> bool {
        self.is_dispatchable()
    }
}

/// A chain event observed on a node's stream, kept for the monitoring trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEventInfo {
    pub network: String,
    pub node_index: u32,
    pub event_id: u64,
    /// Event discriminant, e.g. `deploy_finalized`.
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub block_hash: Option<String>,
    pub deploy_hash: Option<String>,
}
