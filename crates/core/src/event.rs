//! Chain events emitted by node event streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`ChainEvent`], used to key correlator handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    BlockAdded,
    BlockFinalized,
    DeployAdded,
    DeployDiscarded,
    DeployFinalized,
    DeployOrphaned,
    DeployProcessed,
    DeployRequeued,
    Unknown,
}

impl EventKind {
    /// Wire discriminant of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BlockAdded => "block_added",
            EventKind::BlockFinalized => "new_finalized_block",
            EventKind::DeployAdded => "deploy_added",
            EventKind::DeployDiscarded => "deploy_discarded",
            EventKind::DeployFinalized => "deploy_finalized",
            EventKind::DeployOrphaned => "deploy_orphaned",
            EventKind::DeployProcessed => "deploy_processed",
            EventKind::DeployRequeued => "deploy_requeued",
            EventKind::Unknown => "unknown",
        }
    }

    fn from_wire(kind: &str) -> Self {
        match kind {
            "block_added" => EventKind::BlockAdded,
            "new_finalized_block" => EventKind::BlockFinalized,
            "deploy_added" => EventKind::DeployAdded,
            "deploy_discarded" => EventKind::DeployDiscarded,
            "deploy_finalized" => EventKind::DeployFinalized,
            "deploy_orphaned" => EventKind::DeployOrphaned,
            "deploy_processed" => EventKind::DeployProcessed,
            "deploy_requeued" => EventKind::DeployRequeued,
            _ => EventKind::Unknown,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BlockPayload {
    block_hash: String,
    #[serde(default)]
    rank: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DeployPayload {
    deploy_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DeployInBlockPayload {
    block_hash: String,
    deploy_hash: String,
}

/// A node-emitted chain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    BlockAdded { block_hash: String, rank: u64 },
    BlockFinalized { block_hash: String, rank: u64 },
    DeployAdded { deploy_hash: String },
    DeployDiscarded { deploy_hash: String },
    DeployFinalized { block_hash: String, deploy_hash: String },
    DeployOrphaned { deploy_hash: String },
    DeployProcessed { block_hash: String, deploy_hash: String },
    DeployRequeued { deploy_hash: String },
    /// Unrecognised discriminant or malformed payload.
    Unknown { kind: String },
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::BlockAdded { .. } => EventKind::BlockAdded,
            ChainEvent::BlockFinalized { .. } => EventKind::BlockFinalized,
            ChainEvent::DeployAdded { .. } => EventKind::DeployAdded,
            ChainEvent::DeployDiscarded { .. } => EventKind::DeployDiscarded,
            ChainEvent::DeployFinalized { .. } => EventKind::DeployFinalized,
            ChainEvent::DeployOrphaned { .. } => EventKind::DeployOrphaned,
            ChainEvent::DeployProcessed { .. } => EventKind::DeployProcessed,
            ChainEvent::DeployRequeued { .. } => EventKind::DeployRequeued,
            ChainEvent::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Block hash carried by the event, if any.
    pub fn block_hash(&self) -> Option<&str> {
        match self {
            ChainEvent::BlockAdded { block_hash, .. }
            | ChainEvent::BlockFinalized { block_hash, .. }
            | ChainEvent::DeployFinalized { block_hash, .. }
            | ChainEvent::DeployProcessed { block_hash, .. } => Some(block_hash),
            ChainEvent::DeployAdded { .. }
            | ChainEvent::DeployDiscarded { .. }
            | ChainEvent::DeployOrphaned { .. }
            | ChainEvent::DeployRequeued { .. }
            | ChainEvent::Unknown { .. } => None,
        }
    }

    /// Deploy hash carried by the event, if any.
    pub fn deploy_hash(&self) -> Option<&str> {
        match self {
            ChainEvent::DeployAdded { deploy_hash }
            | ChainEvent::DeployDiscarded { deploy_hash }
            | ChainEvent::DeployFinalized { deploy_hash, .. }
            | ChainEvent::DeployOrphaned { deploy_hash }
            | ChainEvent::DeployProcessed { deploy_hash, .. }
            | ChainEvent::DeployRequeued { deploy_hash } => Some(deploy_hash),
            ChainEvent::BlockAdded { .. }
            | ChainEvent::BlockFinalized { .. }
            | ChainEvent::Unknown { .. } => None,
        }
    }

    /// Check if this is a block-level event.
    pub fn is_block_event(&self) -> bool {
        matches!(
            self,
            ChainEvent::BlockAdded { .. } | ChainEvent::BlockFinalized { .. }
        )
    }

    fn from_wire(kind: &str, data: serde_json::Value) -> Self {
        let unknown = || ChainEvent::Unknown {
            kind: kind.to_string(),
        };
        match EventKind::from_wire(kind) {
            EventKind::BlockAdded => serde_json::from_value::<BlockPayload>(data)
                .map(|p| ChainEvent::BlockAdded {
                    block_hash: p.block_hash,
                    rank: p.rank,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::BlockFinalized => serde_json::from_value::<BlockPayload>(data)
                .map(|p| ChainEvent::BlockFinalized {
                    block_hash: p.block_hash,
                    rank: p.rank,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::DeployAdded => serde_json::from_value::<DeployPayload>(data)
                .map(|p| ChainEvent::DeployAdded {
                    deploy_hash: p.deploy_hash,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::DeployDiscarded => serde_json::from_value::<DeployPayload>(data)
                .map(|p| ChainEvent::DeployDiscarded {
                    deploy_hash: p.deploy_hash,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::DeployFinalized => serde_json::from_value::<DeployInBlockPayload>(data)
                .map(|p| ChainEvent::DeployFinalized {
                    block_hash: p.block_hash,
                    deploy_hash: p.deploy_hash,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::DeployOrphaned => serde_json::from_value::<DeployPayload>(data)
                .map(|p| ChainEvent::DeployOrphaned {
                    deploy_hash: p.deploy_hash,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::DeployProcessed => serde_json::from_value::<DeployInBlockPayload>(data)
                .map(|p| ChainEvent::DeployProcessed {
                    block_hash: p.block_hash,
                    deploy_hash: p.deploy_hash,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::DeployRequeued => serde_json::from_value::<DeployPayload>(data)
                .map(|p| ChainEvent::DeployRequeued {
                    deploy_hash: p.deploy_hash,
                })
                .unwrap_or_else(|_| unknown()),
            EventKind::Unknown => unknown(),
        }
    }

    fn to_wire(&self) -> (String, serde_json::Value) {
        let data = match self {
            ChainEvent::BlockAdded { block_hash, rank }
            | ChainEvent::BlockFinalized { block_hash, rank } => {
                serde_json::json!({ "block_hash": block_hash, "rank": rank })
            }
            ChainEvent::DeployFinalized {
                block_hash,
                deploy_hash,
            }
            | ChainEvent::DeployProcessed {
                block_hash,
                deploy_hash,
            } => serde_json::json!({ "block_hash": block_hash, "deploy_hash": deploy_hash }),
            ChainEvent::DeployAdded { deploy_hash }
            | ChainEvent::DeployDiscarded { deploy_hash }
            | ChainEvent::DeployOrphaned { deploy_hash }
            | ChainEvent::DeployRequeued { deploy_hash } => {
                serde_json::json!({ "deploy_hash": deploy_hash })
            }
            ChainEvent::Unknown { .. } => serde_json::Value::Null,
        };
        let kind = match self {
            ChainEvent::Unknown { kind } => kind.clone(),
            other => other.type_name().to_string(),
        };
        (kind, data)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    event_id: u64,
    timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// A chain event with its stream position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic id assigned by the emitting node.
    pub event_id: u64,
    pub timestamp: DateTime<Utc>,
    pub event: ChainEvent,
}

impl EventEnvelope {
    pub fn new(event_id: u64, event: ChainEvent) -> Self {
        Self {
            event_id,
            timestamp: Utc::now(),
            event,
        }
    }

    /// Decode one line of a newline-delimited event stream.
    ///
    /// Only a malformed envelope is an error; an unrecognised discriminant or
    /// payload decodes to [`ChainEvent::Unknown`].
    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        let wire: WireEnvelope = serde_json::from_str(line)?;
        Ok(Self {
            event_id: wire.event_id,
            timestamp: wire.timestamp,
            event: ChainEvent::from_wire(&wire.kind, wire.data),
        })
    }

    /// Encode as one line of a newline-delimited event stream.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let (kind, data) = self.event.to_wire();
        serde_json::to_string(&WireEnvelope {
            event_id: self.event_id,
            timestamp: self.timestamp,
            kind,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_deploy_finalized() {
        let line = r#"{"event_id":42,"timestamp":"2024-01-01T00:00:00Z","type":"deploy_finalized","data":{"block_hash":"b1","deploy_hash":"d1"}}"#;
        let env = EventEnvelope::decode(line).unwrap();
        assert_eq!(env.event_id, 42);
        assert_eq!(env.event.kind(), EventKind::DeployFinalized);
        assert_eq!(env.event.block_hash(), Some("b1"));
        assert_eq!(env.event.deploy_hash(), Some("d1"));
    }

    #[test]
    fn test_unknown_discriminant_decodes_to_unknown() {
        let line = r#"{"event_id":1,"timestamp":"2024-01-01T00:00:00Z","type":"step","data":{"x":1}}"#;
        let env = EventEnvelope::decode(line).unwrap();
        assert_eq!(
            env.event,
            ChainEvent::Unknown {
                kind: "step".into()
            }
        );
        assert_eq!(env.event.deploy_hash(), None);
    }

    #[test]
    fn test_malformed_payload_decodes_to_unknown() {
        let line = r#"{"event_id":1,"timestamp":"2024-01-01T00:00:00Z","type":"deploy_added","data":{}}"#;
        let env = EventEnvelope::decode(line).unwrap();
        assert_eq!(env.event.kind(), EventKind::Unknown);
    }

    #[test]
    fn test_malformed_envelope_is_error() {
        assert!(EventEnvelope::decode("not json").is_err());
        assert!(EventEnvelope::decode(r#"{"type":"block_added"}"#).is_err());
    }

    #[test]
    fn test_encode_uses_wire_discriminant() {
        let env = EventEnvelope::new(
            7,
            ChainEvent::BlockFinalized {
                block_hash: "b".into(),
                rank: 3,
            },
        );
        let line = env.encode().unwrap();
        assert!(line.contains(r#""type":"new_finalized_block""#));
        assert_eq!(EventEnvelope::decode(&line).unwrap().event, env.event);
    }
}
