//! Wiring of cache, chain client, engine and monitoring for one invocation.

use chainload_cache::{Cache, CacheError, StorePartition};
use chainload_client::{RpcClient, SimulatedChain, SimulationConfig};
use chainload_core::{ChainClient, ClientError};
use chainload_monitoring::{
    CorrelatorMetrics, EventCorrelator, ListenerConfig, Monitor, MonitorContext, MonitoringError,
};
use chainload_orchestration::{
    EngineConfig, EngineHandle, EngineMetrics, OrchestrationContext, OrchestrationError,
    RunOutcome, StartOutcome, WorkflowEngine,
};
use chainload_types::{ExecutionContext, RunIdentifier, RunStatus};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigError, NetworkFile};

/// Time allowed for every listener to take its monitoring lock.
const LISTENER_STARTUP: Duration = Duration::from_secs(10);

const STREAM_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Chain client error: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Monitoring(#[from] MonitoringError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("No network file given; pass --network-file or --simulate")]
    MissingNetworkFile,

    #[error("Run {run} failed: {reason}")]
    RunFailed { run: String, reason: String },
}

/// Where deploys go.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Real nodes over HTTP.
    Rpc { timeout: Duration },
    /// An in-process chain whose faucet starts with `faucet_balance`.
    Simulated {
        nodes: u32,
        block_interval: Duration,
        faucet_balance: u64,
        deploy_fee: u64,
    },
}

/// One process worth of collaborators.
pub struct App {
    network: String,
    cache: Cache,
    client: Arc<dyn ChainClient>,
    chain: Option<Arc<SimulatedChain>>,
    registry: Registry,
}

impl App {
    /// Register the network definition into `cache` and connect the chain client.
    pub fn bootstrap(
        network: &str,
        definition: Option<NetworkFile>,
        backend: Backend,
        cache: Cache,
    ) -> Result<Self, CliError> {
        match backend {
            Backend::Rpc { timeout } => {
                let definition = definition.ok_or(CliError::MissingNetworkFile)?;
                definition.ensure_network(network)?;
                definition.register(&cache)?;
                Ok(Self::new(network, cache, Arc::new(RpcClient::new(timeout)?), None))
            }
            Backend::Simulated {
                nodes,
                block_interval,
                faucet_balance,
                deploy_fee,
            } => {
                let definition = match definition {
                    Some(definition) => definition,
                    None => NetworkFile::simulated(network, nodes, &mut rand::thread_rng()),
                };
                definition.ensure_network(network)?;
                let faucet = definition.register(&cache)?;

                let chain = SimulatedChain::new(
                    SimulationConfig::default()
                        .with_network(network)
                        .with_block_interval(block_interval)
                        .with_deploy_fee(deploy_fee),
                );
                chain.credit(&faucet.account_id, faucet_balance);
                info!(network, faucet_balance, "Simulated chain ready");
                Ok(Self::new(network, cache, chain.clone(), Some(chain)))
            }
        }
    }

    fn new(
        network: &str,
        cache: Cache,
        client: Arc<dyn ChainClient>,
        chain: Option<Arc<SimulatedChain>>,
    ) -> Self {
        Self {
            network: network.to_string(),
            cache,
            client,
            chain,
            registry: Registry::new(),
        }
    }

    /// Execute every pass of a run, returning the outcome of each.
    pub async fn run_workload(
        &self,
        ctx: ExecutionContext,
        config: EngineConfig,
    ) -> Result<Vec<RunOutcome>, CliError> {
        let metrics = Arc::new(EngineMetrics::register(&self.registry)?);
        let context = OrchestrationContext::new(self.cache.clone(), self.client.clone(), config)
            .with_metrics(metrics);
        let (engine, engine_task) = WorkflowEngine::spawn(context, chainload_generators::registry());
        let mut outcomes = engine.subscribe();

        let monitor = self.spawn_monitor(Some(engine.clone()))?;
        let producer = self.start_chain(&monitor).await?;

        let result = match engine.start_run(ctx.clone()).await {
            Ok(StartOutcome::Locked) => {
                warn!(run = %ctx.run, "Run is locked by another process; nothing to do");
                Ok(Vec::new())
            }
            Ok(StartOutcome::Started) => {
                tokio::select! {
                    collected = collect_outcomes(&mut outcomes, &ctx) => collected,
                    _ = tokio::signal::ctrl_c() => {
                        warn!(run = %ctx.run, "Interrupted");
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e.into()),
        };

        shutdown(engine, engine_task, monitor, producer).await;
        let outcomes = result?;
        if let Some(failed) = outcomes.iter().find(|o| o.status == RunStatus::Failed) {
            return Err(CliError::RunFailed {
                run: failed.run.label(),
                reason: failed.reason.clone().unwrap_or_default(),
            });
        }
        Ok(outcomes)
    }

    /// Correlate events of every monitorable node until interrupted.
    pub async fn monitor(&self) -> Result<(), CliError> {
        let monitor = self.spawn_monitor(None)?;
        let producer = self.start_chain(&monitor).await?;
        info!(network = %self.network, nodes = ?monitor.nodes(), "Monitoring; press Ctrl-C to stop");
        let _ = tokio::signal::ctrl_c().await;
        monitor.shutdown().await;
        if let Some(producer) = producer {
            producer.abort();
        }
        Ok(())
    }

    /// Drop every cached item of the network.
    pub fn flush(&self) -> Result<Vec<(StorePartition, usize)>, CliError> {
        Ok(self.cache.flush_by_network(&self.network)?)
    }

    /// Drop every cached record of one run.
    pub fn flush_run(&self, run: &RunIdentifier) -> Result<usize, CliError> {
        Ok(self.cache.flush_run(run)?)
    }

    /// Prometheus text exposition of everything registered so far.
    pub fn render_metrics(&self) -> Result<String, CliError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn spawn_monitor(&self, engine: Option<EngineHandle>) -> Result<Monitor, CliError> {
        let mut context = MonitorContext::new(self.cache.clone(), self.client.clone());
        if let Some(engine) = engine {
            context = context.with_engine(engine);
        }
        let correlator = EventCorrelator::with_default_handlers(context)
            .with_metrics(Arc::new(CorrelatorMetrics::register(&self.registry)?));
        Ok(Monitor::spawn(Arc::new(correlator), &self.network, ListenerConfig::default())?)
    }

    /// Start block production once every listener holds its lock.
    async fn start_chain(&self, monitor: &Monitor) -> Result<Option<JoinHandle<()>>, CliError> {
        let deadline = tokio::time::Instant::now() + LISTENER_STARTUP;
        for index in monitor.nodes() {
            while !self.cache.is_node_monitored(&self.network, *index)? {
                if tokio::time::Instant::now() >= deadline {
                    warn!(network = %self.network, node = index, "Listener did not start in time");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        let Some(chain) = &self.chain else {
            return Ok(None);
        };
        // Streams subscribe right after the lock is taken.
        tokio::time::sleep(STREAM_SETTLE).await;
        Ok(Some(chain.spawn()))
    }
}

async fn collect_outcomes(
    outcomes: &mut tokio::sync::broadcast::Receiver<RunOutcome>,
    ctx: &ExecutionContext,
) -> Result<Vec<RunOutcome>, CliError> {
    let mut collected = Vec::new();
    loop {
        match outcomes.recv().await {
            Ok(outcome) if outcome.run == ctx.run => {
                info!(
                    run = %outcome.run,
                    pass = outcome.loop_index,
                    status = ?outcome.status,
                    "Pass finished"
                );
                let done = !outcome.continues;
                collected.push(outcome);
                if done {
                    return Ok(collected);
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Run outcomes lagged");
            }
            Err(RecvError::Closed) => return Err(OrchestrationError::EngineStopped.into()),
        }
    }
}

async fn shutdown(
    engine: EngineHandle,
    engine_task: JoinHandle<()>,
    monitor: Monitor,
    producer: Option<JoinHandle<()>>,
) {
    engine.shutdown();
    let _ = engine_task.await;
    monitor.shutdown().await;
    if let Some(producer) = producer {
        producer.abort();
    }
}
