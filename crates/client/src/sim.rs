//! In-process simulated chain.
//!
//! Deploys submitted to any node are queued and included in the next block.
//! Every block is finalized as soon as it is produced, and the full event
//! sequence is broadcast to every open node stream:
//!
//! ```text
//! submit   ──► deploy_added
//! produce  ──► block_added ─► deploy_processed* ─► new_finalized_block ─► deploy_finalized*
//!          └─► deploy_discarded (insufficient balance)
//! ```
//!
//! Every node sees every event, so listeners on different nodes report the
//! same finalization.

use async_trait::async_trait;
use chainload_core::{
    ChainClient, ChainEvent, ClientError, DeployInfo, DeployPayload, DeployRequest, EventEnvelope,
    EventStream,
};
use chainload_types::crypto::{account_id_from_public_hex, content_hash, verify_signature};
use chainload_types::factory::create_block;
use chainload_types::{Block, BlockStatus, KeyPair, Motes, Node};
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

/// Configuration for the simulated chain.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Network name stamped on produced blocks.
    pub network: String,
    /// Time between produced blocks.
    pub block_interval: Duration,
    /// Fee charged to the sender of every executed deploy.
    pub deploy_fee: Motes,
    /// Capacity of each node stream's event buffer.
    pub event_buffer: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            network: "loc1".to_string(),
            block_interval: Duration::from_millis(100),
            deploy_fee: 0,
            event_buffer: 16_384,
        }
    }
}

impl SimulationConfig {
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_block_interval(mut self, interval: Duration) -> Self {
        self.block_interval = interval;
        self
    }

    pub fn with_deploy_fee(mut self, fee: Motes) -> Self {
        self.deploy_fee = fee;
        self
    }
}

struct Pending {
    hash: String,
    request: DeployRequest,
}

#[derive(Default)]
struct ChainState {
    balances: HashMap<String, Motes>,
    pending: Vec<Pending>,
    seen: HashSet<String>,
    /// Hashes of installed contracts.
    contracts: HashSet<String>,
    blocks: HashMap<String, (Block, Vec<DeployInfo>)>,
    height: u64,
    parent: String,
    next_event_id: u64,
    /// Remaining submissions to fail with `Unavailable`.
    outages: u32,
}

impl ChainState {
    fn envelope(&mut self, event: ChainEvent) -> EventEnvelope {
        self.next_event_id += 1;
        EventEnvelope::new(self.next_event_id, event)
    }

    /// Execute a deploy against balances. Returns `false` if it must be discarded.
    fn apply(&mut self, pending: &Pending, fee: Motes) -> bool {
        let request = &pending.request;
        if let Some(contract) = request.payload.contract_hash() {
            if !self.contracts.contains(contract) {
                debug!(deploy_hash = %pending.hash, contract, "Stored contract not installed");
                return false;
            }
        }
        let debit = match &request.payload {
            DeployPayload::Transfer { amount, .. } | DeployPayload::Delegate { amount, .. } => {
                *amount
            }
            DeployPayload::InstallContract { .. } => 0,
        };
        let balance = self.balances.get(&request.sender).copied().unwrap_or(0);
        let Some(remaining) = balance.checked_sub(debit.saturating_add(fee)) else {
            return false;
        };
        self.balances.insert(request.sender.clone(), remaining);
        match &request.payload {
            DeployPayload::Transfer { target, amount, .. } => {
                *self.balances.entry(target.clone()).or_insert(0) += amount;
            }
            DeployPayload::InstallContract { .. } => {
                self.contracts.insert(pending.hash.clone());
            }
            DeployPayload::Delegate { .. } => {}
        }
        true
    }
}

/// A chain that lives in process memory.
pub struct SimulatedChain {
    config: SimulationConfig,
    state: Mutex<ChainState>,
    events: Mutex<broadcast::Sender<EventEnvelope>>,
}

impl std::fmt::Debug for SimulatedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedChain")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SimulatedChain {
    pub fn new(config: SimulationConfig) -> Arc<Self> {
        let (tx, _) = broadcast::channel(config.event_buffer);
        Arc::new(Self {
            config,
            state: Mutex::new(ChainState::default()),
            events: Mutex::new(tx),
        })
    }

    /// Credit an account outside of any deploy (genesis allocation).
    pub fn credit(&self, account_id: &str, amount: Motes) {
        *self
            .state
            .lock()
            .balances
            .entry(account_id.to_string())
            .or_insert(0) += amount;
    }

    /// Balance as held by the chain.
    pub fn balance(&self, account_id: &str) -> Motes {
        self.state
            .lock()
            .balances
            .get(account_id)
            .copied()
            .unwrap_or(0)
    }

    /// Fail the next `count` submissions as if the node were unreachable.
    pub fn fail_next_submissions(&self, count: u32) {
        self.state.lock().outages = count;
    }

    /// Current chain height.
    pub fn height(&self) -> u64 {
        self.state.lock().height
    }

    /// End every open event stream. Later subscriptions receive new events.
    pub fn close_streams(&self) {
        let (tx, _) = broadcast::channel(self.config.event_buffer);
        *self.events.lock() = tx;
    }

    /// Produce one block from the queued deploys and emit its events.
    /// Returns `None` when nothing was queued.
    pub fn produce_block(&self) -> Option<Block> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut state.pending);

        let mut included = Vec::new();
        let mut events = Vec::new();
        for p in pending {
            if state.apply(&p, self.config.deploy_fee) {
                included.push(DeployInfo {
                    deploy_hash: p.hash,
                    sender: p.request.sender,
                    success: true,
                    cost: self.config.deploy_fee,
                });
            } else {
                debug!(deploy_hash = %p.hash, "Deploy discarded");
                let env = state.envelope(ChainEvent::DeployDiscarded {
                    deploy_hash: p.hash,
                });
                events.push(env);
            }
        }

        if included.is_empty() {
            drop(state);
            self.broadcast(events);
            return None;
        }

        state.height += 1;
        let hashes: Vec<&str> = included.iter().map(|d| d.deploy_hash.as_str()).collect();
        let block_hash = content_hash(
            format!("{}:{}:{}", state.height, state.parent, hashes.join(",")).as_bytes(),
        );
        let block = create_block(
            &self.config.network,
            block_hash.clone(),
            state.height,
            Utc::now(),
            included.len() as u32,
            "simulated-validator",
            BlockStatus::Finalized,
        );

        let rank = state.height;
        let env = state.envelope(ChainEvent::BlockAdded {
            block_hash: block_hash.clone(),
            rank,
        });
        events.push(env);
        for d in &included {
            let env = state.envelope(ChainEvent::DeployProcessed {
                block_hash: block_hash.clone(),
                deploy_hash: d.deploy_hash.clone(),
            });
            events.push(env);
        }
        let env = state.envelope(ChainEvent::BlockFinalized {
            block_hash: block_hash.clone(),
            rank,
        });
        events.push(env);
        for d in &included {
            let env = state.envelope(ChainEvent::DeployFinalized {
                block_hash: block_hash.clone(),
                deploy_hash: d.deploy_hash.clone(),
            });
            events.push(env);
        }

        state.parent = block_hash.clone();
        state
            .blocks
            .insert(block_hash, (block.clone(), included));
        drop(state);

        self.broadcast(events);
        Some(block)
    }

    fn broadcast(&self, events: Vec<EventEnvelope>) {
        let tx = self.events.lock();
        for env in events {
            // No subscribers is not an error for a chain.
            let _ = tx.send(env);
        }
    }

    /// Spawn the block production loop.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let chain = Arc::clone(self);
        info!(
            network = %chain.config.network,
            block_interval_ms = chain.config.block_interval.as_millis() as u64,
            "Simulated chain started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(chain.config.block_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Some(block) = chain.produce_block() {
                    debug!(
                        height = block.rank,
                        deploys = block.deploy_count,
                        "Simulated block finalized"
                    );
                }
            }
        })
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    async fn submit_deploy(
        &self,
        node: &Node,
        key_pair: &KeyPair,
        request: &DeployRequest,
    ) -> Result<String, ClientError> {
        let signature = request.sign(key_pair)?;
        if !verify_signature(&request.sender_public_key, &request.signing_bytes(), &signature) {
            return Err(ClientError::Rejected {
                status: 401,
                message: "invalid signature".to_string(),
            });
        }
        let derived = account_id_from_public_hex(&request.sender_public_key)
            .map_err(|e| ClientError::Rejected {
                status: 400,
                message: e.to_string(),
            })?;
        if derived != request.sender {
            return Err(ClientError::Rejected {
                status: 400,
                message: "sender does not match public key".to_string(),
            });
        }

        let hash = request.hash();
        let env = {
            let mut state = self.state.lock();
            if state.outages > 0 {
                state.outages -= 1;
                return Err(ClientError::Unavailable(format!(
                    "{} simulated outage",
                    node.label()
                )));
            }
            if !state.seen.insert(hash.clone()) {
                return Err(ClientError::Rejected {
                    status: 409,
                    message: format!("duplicate deploy {hash}"),
                });
            }
            state.pending.push(Pending {
                hash: hash.clone(),
                request: request.clone(),
            });
            state.envelope(ChainEvent::DeployAdded {
                deploy_hash: hash.clone(),
            })
        };
        self.broadcast(vec![env]);
        Ok(hash)
    }

    async fn get_balance(&self, _node: &Node, account_id: &str) -> Result<Motes, ClientError> {
        Ok(self.balance(account_id))
    }

    async fn get_block(&self, _node: &Node, block_hash: &str) -> Result<Block, ClientError> {
        self.state
            .lock()
            .blocks
            .get(block_hash)
            .map(|(block, _)| block.clone())
            .ok_or_else(|| ClientError::NotFound(block_hash.to_string()))
    }

    async fn get_deploys(
        &self,
        _node: &Node,
        block_hash: &str,
    ) -> Result<Vec<DeployInfo>, ClientError> {
        self.state
            .lock()
            .blocks
            .get(block_hash)
            .map(|(_, deploys)| deploys.clone())
            .ok_or_else(|| ClientError::NotFound(block_hash.to_string()))
    }

    async fn stream_events(&self, node: &Node) -> Result<EventStream, ClientError> {
        let rx = self.events.lock().subscribe();
        let label = node.label();
        debug!(node = %label, "Simulated event stream opened");
        let stream = BroadcastStream::new(rx).map(move |item| {
            item.map_err(|e| ClientError::Unavailable(format!("{label}: {e}")))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainload_types::factory::create_node;
    use chainload_types::{Account, AccountType, ContractType, NamedKey, NodeStatus, NodeType};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn node(index: u32) -> Node {
        create_node(
            "loc1",
            index,
            "sim",
            0,
            0,
            NodeStatus::Healthy,
            NodeType::Full,
            1,
        )
        .unwrap()
    }

    fn account(rng: &mut ChaCha8Rng) -> Account {
        let key_pair = KeyPair::generate(rng);
        let account_id = key_pair.account_id().unwrap();
        Account {
            network: "loc1".into(),
            run: None,
            index: 0,
            account_type: AccountType::NetworkFaucet,
            key_pair,
            account_id,
            balance: 0,
        }
    }

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let chain = SimulatedChain::new(SimulationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (a, b) = (account(&mut rng), account(&mut rng));
        chain.credit(&a.account_id, 1000);

        chain
            .submit_transfer(&node(1), &a, &b, 100, None)
            .await
            .unwrap();
        let block = chain.produce_block().unwrap();

        assert_eq!(chain.balance(&a.account_id), 900);
        assert_eq!(chain.get_balance(&node(2), &b.account_id).await.unwrap(), 100);
        assert_eq!(chain.get_block(&node(1), &block.block_hash).await.unwrap(), block);
        assert_eq!(
            chain
                .get_deploys(&node(1), &block.block_hash)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_absent_account_balance_is_zero() {
        let chain = SimulatedChain::new(SimulationConfig::default());
        assert_eq!(chain.get_balance(&node(1), "nobody").await.unwrap(), 0);
        assert!(matches!(
            chain.get_block(&node(1), "missing").await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_every_stream_sees_finalization() {
        let chain = SimulatedChain::new(SimulationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let (a, b) = (account(&mut rng), account(&mut rng));
        chain.credit(&a.account_id, 10);

        let mut s1 = chain.stream_events(&node(1)).await.unwrap();
        let mut s2 = chain.stream_events(&node(2)).await.unwrap();

        let hash = chain.submit_transfer(&node(1), &a, &b, 5, None).await.unwrap();
        chain.produce_block();

        for stream in [&mut s1, &mut s2] {
            let mut kinds = Vec::new();
            for _ in 0..5 {
                kinds.push(stream.next().await.unwrap().unwrap().event);
            }
            assert!(matches!(&kinds[0], ChainEvent::DeployAdded { deploy_hash } if *deploy_hash == hash));
            assert!(matches!(kinds[1], ChainEvent::BlockAdded { .. }));
            assert!(matches!(kinds[2], ChainEvent::DeployProcessed { .. }));
            assert!(matches!(kinds[3], ChainEvent::BlockFinalized { .. }));
            assert!(matches!(&kinds[4], ChainEvent::DeployFinalized { deploy_hash, .. } if *deploy_hash == hash));
        }
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_discarded() {
        let chain = SimulatedChain::new(SimulationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (a, b) = (account(&mut rng), account(&mut rng));
        let mut stream = chain.stream_events(&node(1)).await.unwrap();

        chain.submit_transfer(&node(1), &a, &b, 5, None).await.unwrap();
        assert!(chain.produce_block().is_none());
        assert_eq!(chain.height(), 0);

        stream.next().await.unwrap().unwrap();
        let discarded = stream.next().await.unwrap().unwrap();
        assert!(matches!(discarded.event, ChainEvent::DeployDiscarded { .. }));
    }

    #[tokio::test]
    async fn test_stored_transfer_requires_installed_contract() {
        let chain = SimulatedChain::new(SimulationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let (a, b) = (account(&mut rng), account(&mut rng));
        chain.credit(&a.account_id, 100);

        let mut named_key = NamedKey {
            network: "loc1".into(),
            account_index: 0,
            contract_type: ContractType::TransferU512Stored,
            name: "transfer_u512_stored".into(),
            hash: "not-installed".into(),
        };
        chain
            .submit_transfer(&node(1), &a, &b, 10, Some(&named_key))
            .await
            .unwrap();
        assert!(chain.produce_block().is_none());
        assert_eq!(chain.balance(&b.account_id), 0);

        let install = DeployRequest::new(
            &a,
            DeployPayload::InstallContract {
                contract_type: ContractType::TransferU512Stored,
            },
        );
        named_key.hash = chain.submit_deploy(&node(1), &a.key_pair, &install).await.unwrap();
        chain.produce_block().unwrap();

        chain
            .submit_transfer(&node(1), &a, &b, 10, Some(&named_key))
            .await
            .unwrap();
        chain.produce_block().unwrap();
        assert_eq!(chain.balance(&b.account_id), 10);
    }

    #[tokio::test]
    async fn test_simulated_outage_and_close() {
        let chain = SimulatedChain::new(SimulationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let (a, b) = (account(&mut rng), account(&mut rng));
        chain.fail_next_submissions(1);
        let err = chain.submit_transfer(&node(1), &a, &b, 1, None).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(chain.submit_transfer(&node(1), &a, &b, 1, None).await.is_ok());

        let mut stream = chain.stream_events(&node(1)).await.unwrap();
        chain.close_streams();
        assert!(stream.next().await.is_none());
    }
}
