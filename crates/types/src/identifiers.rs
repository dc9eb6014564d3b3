//! Identifiers and fixed-width index labels.
//!
//! Index labels appear as cache key segments, so their width is part of the
//! persisted layout: node `N-0004`, account `A-000001`, run `R-001`,
//! loop `I-0001`, lock `L-001`, event `E-000000042`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label for a node index.
pub fn node_label(index: u32) -> String {
    format!("N-{index:04}")
}

/// Label for an account index.
pub fn account_label(index: u32) -> String {
    format!("A-{index:06}")
}

/// Label for a run index.
pub fn run_label(index: u32) -> String {
    format!("R-{index:03}")
}

/// Label for a loop index.
pub fn loop_label(index: u32) -> String {
    format!("I-{index:04}")
}

/// Label for a lock slot.
pub fn lock_label(index: u32) -> String {
    format!("L-{index:03}")
}

/// Label for a node event id.
pub fn event_label(event_id: u64) -> String {
    format!("E-{event_id:09}")
}

/// Identifies a network by name (e.g. `lrt1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkIdentifier {
    pub name: String,
}

impl NetworkIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for NetworkIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Identifies a node within a network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdentifier {
    pub network: NetworkIdentifier,
    /// One-based node index.
    pub index: u32,
}

impl NodeIdentifier {
    pub fn label(&self) -> String {
        node_label(self.index)
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.label())
    }
}

/// Composite identity of a run: `(network, run_type, run_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunIdentifier {
    pub network: String,
    /// Generator type, e.g. `WG-100`.
    pub run_type: String,
    /// One-based run index.
    pub run_index: u32,
}

impl RunIdentifier {
    pub fn new(network: impl Into<String>, run_type: impl Into<String>, run_index: u32) -> Self {
        Self {
            network: network.into(),
            run_type: run_type.into(),
            run_index,
        }
    }

    pub fn label(&self) -> String {
        run_label(self.run_index)
    }
}

impl fmt::Display for RunIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.network, self.run_type, self.label())
    }
}
