//! Bounded worker pool executing jobs concurrently.
//!
//! Producers push [`Job`]s into a bounded queue; a fixed number of workers
//! share the receiving end. Each outcome goes back to the engine as a
//! [`WorkReport`]. The queue bound is the backpressure on feeders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::actors::{self, Job};
use crate::{OrchestrationContext, OrchestrationError, WorkOutcome};

/// Outcome of one job, addressed to the step that dispatched it.
#[derive(Debug, Clone)]
pub struct WorkReport {
    pub job: Job,
    pub outcome: WorkOutcome,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub done: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    done: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Sending side of the pool. Clones share the same queue.
#[derive(Clone)]
pub struct WorkerPool {
    queue: mpsc::Sender<Job>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawn `workers` tasks draining a queue of `capacity` jobs.
    ///
    /// Workers exit once every `WorkerPool` clone is dropped and the queue is drained.
    pub fn spawn(
        context: OrchestrationContext,
        workers: usize,
        capacity: usize,
        reports: mpsc::UnboundedSender<WorkReport>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let context = context.clone();
                let reports = reports.clone();
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    worker_loop(worker, rx, context, reports, counters).await;
                })
            })
            .collect();

        (
            Self {
                queue: tx,
                counters,
            },
            handles,
        )
    }

    /// Queue a job, waiting while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), OrchestrationError> {
        self.queue
            .send(job)
            .await
            .map_err(|_| OrchestrationError::EngineStopped)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            done: self.counters.done.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    context: OrchestrationContext,
    reports: mpsc::UnboundedSender<WorkReport>,
    counters: Arc<Counters>,
) {
    loop {
        // Lock only while waiting for the next job.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };

        trace!(worker, step = %job.step_label, item = job.item.type_name(), "Executing job");
        let outcome = actors::execute(&context, &job).await;
        let counter = match &outcome {
            WorkOutcome::Done { .. } => &counters.done,
            WorkOutcome::Skipped { .. } => &counters.skipped,
            WorkOutcome::Failed { .. } => &counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if reports.send(WorkReport { job, outcome }).is_err() {
            break;
        }
    }
    debug!(worker, "Worker shutdown complete");
}
