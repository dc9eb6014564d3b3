//! Core contracts for chainload.
//!
//! This crate provides the two seams between the harness and a chain:
//!
//! - [`ChainEvent`]: every notification a node stream may deliver
//! - [`ChainClient`]: submission and query operations against a node
//!
//! # Architecture
//!
//! ```text
//!   Workflow Engine ──► workers ──► ChainClient::submit_deploy ──► node
//!         ▲                                                         │
//!         │                                                         ▼
//!   verify_deploy ◄── Event Correlator ◄── ChainClient::stream_events
//! ```
//!
//! Completion of dispatched work is observed on the event stream, never by
//! polling the node.

mod client;
mod event;

pub use client::{ChainClient, ClientError, DeployInfo, DeployPayload, DeployRequest, EventStream};
pub use event::{ChainEvent, EventEnvelope, EventKind};
