//! Per-node event stream listeners.
//!
//! Each monitorable node gets one task. A task first binds itself to its
//! node with a [`NodeMonitoringLock`]; a node already bound elsewhere is left
//! alone. The task then feeds the node's stream into the correlator,
//! reconnecting with exponential backoff, and releases the lock on exit.

use backon::{ExponentialBuilder, Retryable};
use chainload_cache::Cache;
use chainload_core::EventStream;
use chainload_types::{Node, NodeMonitoringLock};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{EventCorrelator, MonitoringError};

/// Reconnect behaviour of a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Wait before the first reconnect.
    pub initial_backoff: Duration,

    /// Upper bound of a single wait.
    pub max_backoff: Duration,

    /// Consecutive failed connections before the listener gives up; `None` retries forever.
    pub max_reconnects: Option<u32>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            max_reconnects: None,
        }
    }
}

impl ListenerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    pub fn with_max_reconnects(mut self, reconnects: u32) -> Self {
        self.max_reconnects = Some(reconnects);
        self
    }

    /// Jittered exponential backoff between connection attempts.
    pub fn to_backoff_builder(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_jitter();
        match self.max_reconnects {
            Some(reconnects) => builder.with_max_times(reconnects as usize),
            None => builder.without_max_times(),
        }
    }
}

/// Running listeners of one network.
#[derive(Debug)]
pub struct Monitor {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    nodes: Vec<u32>,
}

impl Monitor {
    /// Spawn one listener per monitorable node of `network`.
    pub fn spawn(
        correlator: Arc<EventCorrelator>,
        network: &str,
        config: ListenerConfig,
    ) -> Result<Self, MonitoringError> {
        let nodes: Vec<Node> = correlator
            .context()
            .cache
            .get_nodes(network)?
            .into_iter()
            .filter(Node::is_monitorable)
            .collect();
        if nodes.is_empty() {
            warn!(network, "No monitorable nodes");
        }

        let (shutdown, rx) = watch::channel(false);
        let indices = nodes.iter().map(|n| n.index).collect();
        let tasks = nodes
            .into_iter()
            .map(|node| {
                let listener = NodeListener {
                    node,
                    correlator: Arc::clone(&correlator),
                    config: config.clone(),
                };
                tokio::spawn(listener.run(rx.clone()))
            })
            .collect();

        Ok(Self {
            shutdown,
            tasks,
            nodes: indices,
        })
    }

    /// Node indices with a spawned listener.
    pub fn nodes(&self) -> &[u32] {
        &self.nodes
    }

    /// Wait until every listener exits on its own.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Stop every listener and wait for their locks to be released.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.join().await;
    }
}

struct NodeListener {
    node: Node,
    correlator: Arc<EventCorrelator>,
    config: ListenerConfig,
}

impl NodeListener {
    async fn run(self, shutdown: watch::Receiver<bool>) {
        let cache = self.correlator.context().cache.clone();
        let lock = NodeMonitoringLock::new(self.node.network.clone(), self.node.index);
        match cache.acquire_monitoring_lock(&lock) {
            Ok(true) => {}
            Ok(false) => {
                info!(node = %self.node.label(), "Node already monitored, listener not started");
                return;
            }
            Err(e) => {
                warn!(node = %self.node.label(), error = %e, "Failed to acquire monitoring lock");
                return;
            }
        }

        info!(node = %self.node.label(), url = %self.node.event_url(), "Listener started");
        self.consume(shutdown).await;
        release(&cache, &lock);
        info!(node = %self.node.label(), "Listener stopped");
    }

    async fn consume(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        loop {
            let mut stream = tokio::select! {
                _ = shutdown.changed() => return,
                connected = self.connect() => match connected {
                    Some(stream) => stream,
                    None => return,
                },
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    item = stream.next() => match item {
                        Some(Ok(envelope)) => {
                            // Handler failures are counted and logged by the correlator.
                            let _ = self.correlator.process(&self.node, &envelope).await;
                        }
                        Some(Err(e)) => {
                            warn!(node = %self.node.label(), error = %e, "Event stream error");
                            break;
                        }
                        None => {
                            debug!(node = %self.node.label(), "Event stream closed");
                            break;
                        }
                    },
                }
            }

            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(self.config.initial_backoff) => {}
            }
        }
    }

    /// Open the node's stream, backing off between failed attempts.
    async fn connect(&self) -> Option<EventStream> {
        let client = &self.correlator.context().client;
        let result = (|| client.stream_events(&self.node))
            .retry(self.config.to_backoff_builder())
            .notify(|err, wait| {
                warn!(
                    node = %self.node.label(),
                    error = %err,
                    wait = ?wait,
                    "Event stream connection failed"
                );
            })
            .await;
        match result {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(node = %self.node.label(), error = %e, "Giving up on event stream");
                None
            }
        }
    }
}

fn release(cache: &Cache, lock: &NodeMonitoringLock) {
    if let Err(e) = cache.release_monitoring_lock(lock) {
        warn!(node = %lock.node_label(), error = %e, "Failed to release monitoring lock");
    }
}
