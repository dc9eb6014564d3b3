//! Handlers invoked by the correlator, one per event kind.

use async_trait::async_trait;
use chainload_cache::{Cache, CacheError};
use chainload_core::{ChainClient, EventEnvelope};
use chainload_orchestration::EngineHandle;
use chainload_types::{Deploy, DeployStatus, Node, NodeEventInfo};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::MonitoringError;

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct MonitorContext {
    pub cache: Cache,
    pub client: Arc<dyn ChainClient>,
    /// Engine to report correlated deploys to; `None` when only monitoring.
    pub engine: Option<EngineHandle>,
}

impl std::fmt::Debug for MonitorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorContext")
            .field("engine", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}

impl MonitorContext {
    pub fn new(cache: Cache, client: Arc<dyn ChainClient>) -> Self {
        Self {
            cache,
            client,
            engine: None,
        }
    }

    pub fn with_engine(mut self, engine: EngineHandle) -> Self {
        self.engine = Some(engine);
        self
    }
}

/// Reacts to one kind of chain event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        context: &MonitorContext,
        node: &Node,
        envelope: &EventEnvelope,
        info: &NodeEventInfo,
    ) -> Result<(), MonitoringError>;
}

fn deploy_hash(info: &NodeEventInfo) -> Result<&str, MonitoringError> {
    info.deploy_hash
        .as_deref()
        .ok_or(MonitoringError::MissingField {
            event_id: info.event_id,
            what: "deploy hash",
        })
}

fn block_hash(info: &NodeEventInfo) -> Result<&str, MonitoringError> {
    info.block_hash
        .as_deref()
        .ok_or(MonitoringError::MissingField {
            event_id: info.event_id,
            what: "block hash",
        })
}

/// Deploy dispatched by a run on this network, or `None` for foreign deploys.
fn correlate(cache: &Cache, network: &str, hash: &str) -> Result<Option<Deploy>, MonitoringError> {
    match cache.get_deploy(network, hash) {
        Ok(deploy) => Ok(Some(deploy)),
        Err(CacheError::NotFound(_)) => {
            debug!(network, deploy_hash = hash, "Deploy not dispatched by any run");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Correlates finalized deploys with their runs and reports them to the engine.
///
/// The first stream to claim the finalization in the MONITORING partition
/// applies it; other streams reporting the same deploy are no-ops.
#[derive(Debug, Default)]
pub struct DeployFinalizedHandler;

#[async_trait]
impl EventHandler for DeployFinalizedHandler {
    async fn handle(
        &self,
        context: &MonitorContext,
        node: &Node,
        _envelope: &EventEnvelope,
        info: &NodeEventInfo,
    ) -> Result<(), MonitoringError> {
        let hash = deploy_hash(info)?;
        let Some(deploy) = correlate(&context.cache, &node.network, hash)? else {
            return Ok(());
        };
        if deploy.status == DeployStatus::Finalized {
            return Ok(());
        }

        let block = context.client.get_block(node, block_hash(info)?).await?;
        if !context.cache.set_node_event_once(info, hash)? {
            debug!(node = %node.label(), deploy_hash = hash, "Finalization already claimed");
            return Ok(());
        }

        let updated = match context.cache.update_deploy(&deploy, |d| {
            d.update_on_finalization(node.index, &block);
        }) {
            Ok(updated) => updated,
            Err(e) => {
                // Leave the finalization for the next stream that reports it.
                if let Err(release) = context.cache.release_node_event(info, hash) {
                    warn!(node = %node.label(), deploy_hash = hash, error = %release, "Failed to release finalization claim");
                }
                return Err(e.into());
            }
        };
        info!(
            run = %updated.run,
            step = %updated.step_label,
            node = %node.label(),
            deploy_hash = hash,
            latency_ms = updated.finalization_duration_ms.unwrap_or_default(),
            "Deploy finalized"
        );
        if let Some(engine) = &context.engine {
            engine.verify_deploy(updated)?;
        }
        Ok(())
    }
}

/// Marks deploys processed unless they were already finalized.
#[derive(Debug, Default)]
pub struct DeployProcessedHandler;

#[async_trait]
impl EventHandler for DeployProcessedHandler {
    async fn handle(
        &self,
        context: &MonitorContext,
        node: &Node,
        _envelope: &EventEnvelope,
        info: &NodeEventInfo,
    ) -> Result<(), MonitoringError> {
        let hash = deploy_hash(info)?;
        if let Some(deploy) = correlate(&context.cache, &node.network, hash)? {
            context.cache.update_deploy(&deploy, |d| {
                d.update_status(DeployStatus::Processed);
            })?;
        }
        Ok(())
    }
}

/// Marks deploys discarded and reports them to the engine.
#[derive(Debug, Default)]
pub struct DeployDiscardedHandler;

#[async_trait]
impl EventHandler for DeployDiscardedHandler {
    async fn handle(
        &self,
        context: &MonitorContext,
        node: &Node,
        _envelope: &EventEnvelope,
        info: &NodeEventInfo,
    ) -> Result<(), MonitoringError> {
        let hash = deploy_hash(info)?;
        let Some(deploy) = correlate(&context.cache, &node.network, hash)? else {
            return Ok(());
        };
        let updated = context.cache.update_deploy(&deploy, |d| {
            d.update_status(DeployStatus::Discarded);
        })?;
        if updated.status != DeployStatus::Discarded {
            return Ok(());
        }
        warn!(run = %updated.run, step = %updated.step_label, deploy_hash = hash, "Deploy discarded");
        if let Some(engine) = &context.engine {
            engine.deploy_discarded(updated)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DeployOrphanedHandler;

#[async_trait]
impl EventHandler for DeployOrphanedHandler {
    async fn handle(
        &self,
        context: &MonitorContext,
        node: &Node,
        _envelope: &EventEnvelope,
        info: &NodeEventInfo,
    ) -> Result<(), MonitoringError> {
        let hash = deploy_hash(info)?;
        if let Some(deploy) = correlate(&context.cache, &node.network, hash)? {
            let updated = context.cache.update_deploy(&deploy, |d| {
                d.update_status(DeployStatus::Orphaned);
            })?;
            warn!(run = %updated.run, deploy_hash = hash, status = ?updated.status, "Deploy orphaned");
        }
        Ok(())
    }
}

/// Keeps a trail of finalized blocks, once per block.
#[derive(Debug, Default)]
pub struct BlockFinalizedHandler;

#[async_trait]
impl EventHandler for BlockFinalizedHandler {
    async fn handle(
        &self,
        context: &MonitorContext,
        node: &Node,
        _envelope: &EventEnvelope,
        info: &NodeEventInfo,
    ) -> Result<(), MonitoringError> {
        let hash = block_hash(info)?;
        if context.cache.set_node_event_once(info, hash)? {
            debug!(node = %node.label(), block_hash = hash, "Block finalized");
        }
        Ok(())
    }
}
