//! The workflow engine.
//!
//! A single task owns every active run. It walks each run's generator one
//! step at a time: the step's work is fed into the [`WorkerPool`], worker
//! reports and deploy notifications advance the step's [`StepProgress`], and
//! once every item resolved the step's verification decides whether the run
//! moves on. All I/O besides cache bookkeeping runs in spawned tasks that
//! report back through the engine inbox.

use chainload_cache::Cache;
use chainload_types::factory::{create_run_info, create_run_lock, create_run_step};
use chainload_types::{
    Deploy, DeployStatus, ExecutionContext, RunIdentifier, RunInfo, RunLock, RunStatus,
    RunStepStatus,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actors::Job;
use crate::pool::{PoolStats, WorkReport, WorkerPool};
use crate::state::{StepProgress, StepSignal};
use crate::{
    Generator, GeneratorRegistry, OrchestrationContext, OrchestrationError, Step,
    VerificationError, WorkDescriptor,
};

const OUTCOME_BUFFER: usize = 256;

/// Result of asking the engine to start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Another process holds the run's lock; nothing was done.
    Locked,
}

/// Broadcast when a run pass ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run: RunIdentifier,
    pub loop_index: u32,
    pub status: RunStatus,
    pub reason: Option<String>,
    /// Whether another pass is scheduled.
    pub continues: bool,
}

/// Inputs of the engine task.
#[derive(Debug)]
pub enum EngineEvent {
    StartRun {
        ctx: ExecutionContext,
        reply: oneshot::Sender<Result<StartOutcome, OrchestrationError>>,
    },
    /// Start the next pass of a run, renewing the lock held since the last one.
    StartPass {
        ctx: ExecutionContext,
        lock: RunLock,
    },
    DeployFinalized {
        deploy: Deploy,
    },
    DeployDiscarded {
        deploy: Deploy,
    },
    DispatchComplete {
        run: RunIdentifier,
        loop_index: u32,
        step_label: String,
        count: usize,
    },
    /// The step's items could not all be queued.
    DispatchFailed {
        run: RunIdentifier,
        loop_index: u32,
        step_label: String,
        reason: String,
    },
    StepVerified {
        run: RunIdentifier,
        loop_index: u32,
        step_label: String,
        result: Result<(), VerificationError>,
    },
    Shutdown,
}

impl EngineEvent {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            EngineEvent::StartRun { .. } => "StartRun",
            EngineEvent::StartPass { .. } => "StartPass",
            EngineEvent::DeployFinalized { .. } => "DeployFinalized",
            EngineEvent::DeployDiscarded { .. } => "DeployDiscarded",
            EngineEvent::DispatchComplete { .. } => "DispatchComplete",
            EngineEvent::DispatchFailed { .. } => "DispatchFailed",
            EngineEvent::StepVerified { .. } => "StepVerified",
            EngineEvent::Shutdown => "Shutdown",
        }
    }
}

/// Client side of the engine. Cheap to clone.
#[derive(Clone)]
pub struct EngineHandle {
    inbox: mpsc::UnboundedSender<EngineEvent>,
    outcomes: broadcast::Sender<RunOutcome>,
    pool: WorkerPool,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

impl EngineHandle {
    /// Start the first pass of a run.
    pub async fn start_run(&self, ctx: ExecutionContext) -> Result<StartOutcome, OrchestrationError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::StartRun { ctx, reply })?;
        rx.await.map_err(|_| OrchestrationError::EngineStopped)?
    }

    /// Report a correlated deploy that reached finalization.
    pub fn verify_deploy(&self, deploy: Deploy) -> Result<(), OrchestrationError> {
        self.send(EngineEvent::DeployFinalized { deploy })
    }

    /// Report a correlated deploy that the chain discarded.
    pub fn deploy_discarded(&self, deploy: Deploy) -> Result<(), OrchestrationError> {
        self.send(EngineEvent::DeployDiscarded { deploy })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunOutcome> {
        self.outcomes.subscribe()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn shutdown(&self) {
        let _ = self.inbox.send(EngineEvent::Shutdown);
    }

    fn send(&self, event: EngineEvent) -> Result<(), OrchestrationError> {
        self.inbox
            .send(event)
            .map_err(|_| OrchestrationError::EngineStopped)
    }
}

/// A run pass in flight.
struct ActiveRun {
    ctx: ExecutionContext,
    generator: Arc<Generator>,
    lock: RunLock,
    info: RunInfo,
    /// Position of the current step.
    cursor: Option<(usize, usize)>,
    /// Current step and its progress, once dispatched.
    current: Option<(Arc<dyn Step>, StepProgress)>,
}

/// The engine task state.
pub struct WorkflowEngine {
    context: OrchestrationContext,
    registry: GeneratorRegistry,
    pool: WorkerPool,
    inbox: mpsc::UnboundedSender<EngineEvent>,
    outcomes: broadcast::Sender<RunOutcome>,
    runs: HashMap<RunIdentifier, ActiveRun>,
    /// Locks held by runs sleeping until their next pass.
    waiting: HashMap<RunIdentifier, RunLock>,
}

impl WorkflowEngine {
    /// Spawn the engine and its worker pool.
    pub fn spawn(
        context: OrchestrationContext,
        registry: GeneratorRegistry,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (pool, _workers) = WorkerPool::spawn(
            context.clone(),
            context.config.workers,
            context.config.queue_capacity,
            report_tx,
        );
        Self::start(context, registry, pool, report_rx)
    }

    fn start(
        context: OrchestrationContext,
        registry: GeneratorRegistry,
        pool: WorkerPool,
        report_rx: mpsc::UnboundedReceiver<WorkReport>,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (outcomes, _) = broadcast::channel(OUTCOME_BUFFER);
        let handle = EngineHandle {
            inbox: inbox_tx.clone(),
            outcomes: outcomes.clone(),
            pool: pool.clone(),
        };
        let engine = Self {
            context,
            registry,
            pool,
            inbox: inbox_tx,
            outcomes,
            runs: HashMap::new(),
            waiting: HashMap::new(),
        };
        let task = tokio::spawn(engine.run(inbox_rx, report_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<EngineEvent>,
        mut reports: mpsc::UnboundedReceiver<WorkReport>,
    ) {
        loop {
            tokio::select! {
                Some(event) = inbox.recv() => {
                    if matches!(event, EngineEvent::Shutdown) {
                        break;
                    }
                    self.handle_event(event);
                }
                Some(report) = reports.recv() => self.handle_report(report),
                else => break,
            }
        }
        self.abort_all("Engine shutdown");
        debug!("Workflow engine shutdown complete");
    }

    fn handle_event(&mut self, event: EngineEvent) {
        debug!(event = event.type_name(), "Engine event");
        match event {
            EngineEvent::StartRun { ctx, reply } => {
                let _ = reply.send(self.start_run(ctx));
            }
            EngineEvent::StartPass { ctx, lock } => {
                let run = ctx.run.clone();
                if self.waiting.remove(&run).is_none() {
                    debug!(run = %run, "Next pass no longer scheduled");
                    return;
                }
                match self.start_next_pass(ctx, lock) {
                    Ok(StartOutcome::Started) => {}
                    Ok(StartOutcome::Locked) => {
                        warn!(run = %run, "Run lock taken before next pass, stopping")
                    }
                    Err(e) => error!(run = %run, error = %e, "Failed to start next pass"),
                }
            }
            EngineEvent::DeployFinalized { deploy } => self.on_deploy_finalized(deploy),
            EngineEvent::DeployDiscarded { deploy } => {
                let run = deploy.run.clone();
                self.with_progress(&run, &deploy.step_label, deploy.loop_index, |_, _, p| {
                    p.on_deploy_discarded(&deploy.deploy_hash)
                });
            }
            EngineEvent::DispatchComplete {
                run,
                loop_index,
                step_label,
                count,
            } => {
                self.with_progress(&run, &step_label, loop_index, |_, _, p| {
                    p.on_dispatch_complete(count)
                });
            }
            EngineEvent::DispatchFailed {
                run,
                loop_index,
                step_label,
                reason,
            } => {
                self.with_progress(&run, &step_label, loop_index, |_, _, _| {
                    StepSignal::Failed(reason)
                });
            }
            EngineEvent::StepVerified {
                run,
                loop_index,
                step_label,
                result,
            } => self.on_step_verified(&run, loop_index, &step_label, result),
            EngineEvent::Shutdown => {}
        }
    }

    fn handle_report(&mut self, report: WorkReport) {
        let WorkReport { job, outcome } = report;
        self.with_progress(&job.ctx.run, &job.step_label, job.ctx.loop_index, |_, _, p| {
            p.on_work_reported(&outcome)
        });
    }

    fn on_deploy_finalized(&mut self, deploy: Deploy) {
        let context = self.context.clone();
        let run = deploy.run.clone();
        let applied = self.with_progress(&run, &deploy.step_label, deploy.loop_index, |ctx, step, p| {
            let check = step.verify_deploy(ctx, &context, &deploy);
            p.on_deploy_finalized(&deploy.deploy_hash, check)
        });
        if applied {
            self.context.record(|m| m.deploys_finalized.inc());
        }
    }

    /// Apply an input to the current step if it addresses it, then act on the signal.
    ///
    /// Returns `false` for inputs about runs or steps no longer current.
    fn with_progress<F>(&mut self, run: &RunIdentifier, label: &str, loop_index: u32, f: F) -> bool
    where
        F: FnOnce(&ExecutionContext, &Arc<dyn Step>, &mut StepProgress) -> StepSignal,
    {
        let Some(active) = self.runs.get_mut(run) else {
            debug!(run = %run, step = label, "Ignoring event for inactive run");
            return false;
        };
        let signal = match &mut active.current {
            Some((step, progress)) if progress.is_for(label, loop_index) => {
                f(&active.ctx, step, progress)
            }
            _ => {
                debug!(run = %run, step = label, loop_index, "Ignoring stale step event");
                return false;
            }
        };
        self.handle_signal(run, signal);
        true
    }

    fn handle_signal(&mut self, run: &RunIdentifier, signal: StepSignal) {
        match signal {
            StepSignal::Pending => {}
            StepSignal::ReadyToVerify => self.spawn_verification(run),
            StepSignal::Failed(reason) => self.fail_step(run, reason),
        }
    }

    fn start_run(&mut self, ctx: ExecutionContext) -> Result<StartOutcome, OrchestrationError> {
        let generator = self.generator_for(&ctx)?;
        if self.runs.contains_key(&ctx.run) || self.waiting.contains_key(&ctx.run) {
            return Ok(StartOutcome::Locked);
        }

        let lock = create_run_lock(&ctx);
        if !self.context.cache.acquire_run_lock(&lock)? {
            info!(run = %ctx.run, "Run is locked by another process, nothing to do");
            return Ok(StartOutcome::Locked);
        }
        self.begin_pass(ctx, generator, lock)
    }

    /// Move the lock held since the previous pass to a fresh slot and start the pass.
    fn start_next_pass(
        &mut self,
        ctx: ExecutionContext,
        held: RunLock,
    ) -> Result<StartOutcome, OrchestrationError> {
        let generator = match self.generator_for(&ctx) {
            Ok(generator) => generator,
            Err(e) => {
                self.release_lock(&held);
                return Err(e);
            }
        };
        match self.context.cache.renew_run_lock(&held) {
            Ok(Some(lock)) => self.begin_pass(ctx, generator, lock),
            Ok(None) => {
                self.release_lock(&held);
                Ok(StartOutcome::Locked)
            }
            Err(e) => {
                self.release_lock(&held);
                Err(e.into())
            }
        }
    }

    fn generator_for(&self, ctx: &ExecutionContext) -> Result<Arc<Generator>, OrchestrationError> {
        self.registry
            .get(ctx.run_type())
            .ok_or_else(|| OrchestrationError::UnknownGenerator(ctx.run_type().to_string()))
    }

    fn begin_pass(
        &mut self,
        ctx: ExecutionContext,
        generator: Arc<Generator>,
        lock: RunLock,
    ) -> Result<StartOutcome, OrchestrationError> {
        let mut info = create_run_info(&ctx);
        info.status = RunStatus::Running;
        info.started_at = Some(Utc::now());
        if let Err(e) = self.context.cache.set_run_info(&info) {
            self.release_lock(&lock);
            return Err(e.into());
        }

        info!(
            run = %ctx.run,
            loop_index = ctx.loop_index,
            passes = ctx.total_passes(),
            lock = %lock.label(),
            "Run pass started"
        );
        let run = ctx.run.clone();
        let cursor = generator.first_cursor();
        self.runs.insert(
            run.clone(),
            ActiveRun {
                ctx,
                generator,
                lock,
                info,
                cursor,
                current: None,
            },
        );
        self.drive(&run);
        Ok(StartOutcome::Started)
    }

    fn release_lock(&self, lock: &RunLock) {
        if let Err(e) = self.context.cache.release_run_lock(lock) {
            warn!(run = %lock.run, lock = %lock.label(), error = %e, "Failed to release run lock");
        }
    }

    /// Drop the finalization claims of the run's finalized deploys.
    fn prune_claims(&self, run: &RunIdentifier) {
        let cache = &self.context.cache;
        let pruned = cache.get_deploys_by_run(run).and_then(|deploys| {
            let finalized = deploys
                .iter()
                .filter(|d| d.status == DeployStatus::Finalized)
                .map(|d| d.deploy_hash.as_str());
            cache.prune_deploy_claims(&run.network, finalized)
        });
        match pruned {
            Ok(pruned) => debug!(run = %run, pruned, "Pruned finalization claims"),
            Err(e) => warn!(run = %run, error = %e, "Failed to prune finalization claims"),
        }
    }

    /// Start the step under the cursor, skipping completed and vacuous steps.
    fn drive(&mut self, run: &RunIdentifier) {
        loop {
            let Some(active) = self.runs.get_mut(run) else {
                return;
            };
            let Some((phase, index)) = active.cursor else {
                self.finish_pass(run, RunStatus::Complete, None);
                return;
            };
            let Some((label, step)) = active.generator.step_at(phase, index) else {
                self.finish_pass(run, RunStatus::Complete, None);
                return;
            };
            let ctx = active.ctx.clone();

            match self.context.cache.get_run_step(run, ctx.loop_index, &label) {
                Ok(record) if record.status == RunStepStatus::Complete => {
                    info!(run = %run, step = %label, "Step already complete, skipping");
                    active.cursor = active.generator.next_cursor(phase, index);
                    continue;
                }
                _ => {}
            }

            let record = create_run_step(&ctx, label.clone());
            if let Err(e) = self.context.cache.set_run_step(&record) {
                self.finish_pass(run, RunStatus::Failed, Some(e.to_string()));
                return;
            }

            let descriptor = step.execute(&ctx);
            if descriptor.is_vacuous() {
                debug!(run = %run, step = %label, "Step has no work");
                if let Err(e) = complete_step_record(&self.context.cache, &ctx, &label) {
                    self.finish_pass(run, RunStatus::Failed, Some(e.to_string()));
                    return;
                }
                active.cursor = active.generator.next_cursor(phase, index);
                continue;
            }

            info!(
                run = %run,
                step = %label,
                items = descriptor.cardinality,
                completion = ?descriptor.completion,
                "Step started"
            );
            active.current = Some((
                step,
                StepProgress::new(label.clone(), ctx.loop_index, descriptor.completion),
            ));
            self.spawn_feeder(ctx, label, descriptor);
            return;
        }
    }

    /// Feed a step's items into the pool, then report how many were queued.
    fn spawn_feeder(&self, ctx: ExecutionContext, step_label: String, descriptor: WorkDescriptor) {
        let pool = self.pool.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let mut count = 0;
            for item in descriptor.items() {
                let job = Job {
                    ctx: ctx.clone(),
                    step_label: step_label.clone(),
                    item,
                };
                if let Err(e) = pool.submit(job).await {
                    error!(run = %ctx.run, step = %step_label, queued = count, error = %e, "Work queue closed");
                    let _ = inbox.send(EngineEvent::DispatchFailed {
                        run: ctx.run.clone(),
                        loop_index: ctx.loop_index,
                        step_label,
                        reason: format!("work queue closed after {count} items: {e}"),
                    });
                    return;
                }
                count += 1;
            }
            if count != descriptor.cardinality {
                warn!(
                    run = %ctx.run,
                    step = %step_label,
                    expected = descriptor.cardinality,
                    actual = count,
                    "Step produced a different number of items than declared"
                );
            }
            let _ = inbox.send(EngineEvent::DispatchComplete {
                run: ctx.run.clone(),
                loop_index: ctx.loop_index,
                step_label,
                count,
            });
        });
    }

    fn spawn_verification(&self, run: &RunIdentifier) {
        let Some(active) = self.runs.get(run) else {
            return;
        };
        let Some((step, progress)) = &active.current else {
            return;
        };
        let step = Arc::clone(step);
        let ctx = active.ctx.clone();
        let label = progress.label().to_string();
        let context = self.context.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = step.verify(&ctx, &context, &label).await;
            let _ = inbox.send(EngineEvent::StepVerified {
                run: ctx.run.clone(),
                loop_index: ctx.loop_index,
                step_label: label,
                result,
            });
        });
    }

    fn on_step_verified(
        &mut self,
        run: &RunIdentifier,
        loop_index: u32,
        label: &str,
        result: Result<(), VerificationError>,
    ) {
        let Some(active) = self.runs.get_mut(run) else {
            return;
        };
        match &active.current {
            Some((_, progress)) if progress.is_for(label, loop_index) => {}
            _ => return,
        }
        if let Err(e) = result {
            self.fail_step(run, e.to_string());
            return;
        }

        let ctx = active.ctx.clone();
        if let Err(e) = complete_step_record(&self.context.cache, &ctx, label) {
            self.finish_pass(run, RunStatus::Failed, Some(e.to_string()));
            return;
        }
        self.context.record(|m| m.steps_verified.inc());
        info!(run = %run, step = label, "Step complete");

        if let Some(active) = self.runs.get_mut(run) {
            active.current = None;
            active.cursor = active
                .cursor
                .and_then(|(phase, index)| active.generator.next_cursor(phase, index));
        }
        self.drive(run);
    }

    fn fail_step(&mut self, run: &RunIdentifier, reason: String) {
        let Some(active) = self.runs.get(run) else {
            return;
        };
        if let Some((_, progress)) = &active.current {
            let label = progress.label().to_string();
            let mut record = self
                .context
                .cache
                .get_run_step(run, active.ctx.loop_index, &label)
                .unwrap_or_else(|_| create_run_step(&active.ctx, label.clone()));
            record.status = RunStepStatus::Failed;
            record.ended_at = Some(Utc::now());
            record.reason = Some(reason.clone());
            if let Err(e) = self.context.cache.set_run_step(&record) {
                error!(run = %run, step = %label, error = %e, "Failed to record step failure");
            }
            warn!(run = %run, step = %label, reason = %reason, "Step failed");
        }
        self.context.record(|m| m.steps_failed.inc());
        self.finish_pass(run, RunStatus::Failed, Some(reason));
    }

    /// End the current pass and either schedule the next one, keeping the
    /// lock, or release the lock.
    fn finish_pass(&mut self, run: &RunIdentifier, status: RunStatus, reason: Option<String>) {
        let Some(mut active) = self.runs.remove(run) else {
            return;
        };
        active.info.status = status;
        active.info.ended_at = Some(Utc::now());
        active.info.reason = reason.clone();
        if let Err(e) = self.context.cache.set_run_info(&active.info) {
            error!(run = %run, error = %e, "Failed to record run outcome");
        }
        self.prune_claims(run);

        let continues = status == RunStatus::Complete && active.ctx.has_next_pass();
        if !continues {
            self.release_lock(&active.lock);
        }
        info!(
            run = %run,
            loop_index = active.ctx.loop_index,
            status = %status,
            continues,
            "Run pass finished"
        );
        let _ = self.outcomes.send(RunOutcome {
            run: run.clone(),
            loop_index: active.ctx.loop_index,
            status,
            reason,
            continues,
        });

        if continues {
            let next = active.ctx.next_pass();
            let lock = active.lock.clone();
            self.waiting.insert(run.clone(), lock.clone());
            let inbox = self.inbox.clone();
            let interval = Duration::from_secs(active.ctx.loop_interval);
            tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                let _ = inbox.send(EngineEvent::StartPass { ctx: next, lock });
            });
        }
    }

    fn abort_all(&mut self, reason: &str) {
        let runs: Vec<RunIdentifier> = self.runs.keys().cloned().collect();
        for run in runs {
            self.finish_pass(&run, RunStatus::Failed, Some(reason.to_string()));
        }
        for (run, lock) in std::mem::take(&mut self.waiting) {
            debug!(run = %run, "Dropping scheduled pass");
            self.release_lock(&lock);
        }
    }
}

fn complete_step_record(
    cache: &Cache,
    ctx: &ExecutionContext,
    label: &str,
) -> Result<(), OrchestrationError> {
    let mut record = cache
        .get_run_step(&ctx.run, ctx.loop_index, label)
        .unwrap_or_else(|_| create_run_step(ctx, label));
    record.status = RunStepStatus::Complete;
    record.ended_at = Some(Utc::now());
    cache.set_run_step(&record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Completion, EngineConfig, Phase, WorkItem};
    use async_trait::async_trait;
    use chainload_client::{SimulatedChain, SimulationConfig};
    use chainload_types::factory::{create_execution_context, create_run_id};
    use chainload_types::{AccountType, WorkloadArgs};

    struct Accounts;

    #[async_trait]
    impl Step for Accounts {
        fn action(&self) -> &str {
            "accounts"
        }

        fn execute(&self, ctx: &ExecutionContext) -> WorkDescriptor {
            let users = ctx.args.user_accounts;
            WorkDescriptor::new(Completion::OnDispatch, users as usize, move || {
                (1..=users).map(|index| WorkItem::CreateAccount {
                    index,
                    account_type: AccountType::User,
                })
            })
        }

        async fn verify(
            &self,
            _ctx: &ExecutionContext,
            _context: &OrchestrationContext,
            _label: &str,
        ) -> Result<(), VerificationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_closed_work_queue_fails_the_step() {
        let cache = Cache::in_memory();
        let chain = SimulatedChain::new(SimulationConfig::default());
        let context = OrchestrationContext::new(cache.clone(), chain, EngineConfig::default());

        // A pool whose workers are gone rejects every job.
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (pool, workers) = WorkerPool::spawn(context.clone(), 1, 1, report_tx);
        for worker in workers {
            worker.abort();
            let _ = worker.await;
        }

        let registry = GeneratorRegistry::new().with(
            Generator::new("WG-T9", "accounts").with_phase(Phase::new("phase-01").with_step(Accounts)),
        );
        let (handle, _task) = WorkflowEngine::start(context, registry, pool, report_rx);
        let mut outcomes = handle.subscribe();

        let run = create_run_id("loc1", "WG-T9", 1).unwrap();
        let args = WorkloadArgs {
            user_accounts: 3,
            ..WorkloadArgs::default()
        };
        let ctx = create_execution_context(run, 0, 0, 0, args);
        assert_eq!(handle.start_run(ctx.clone()).await.unwrap(), StartOutcome::Started);

        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.reason.unwrap().contains("work queue closed"));
        assert_eq!(
            cache
                .get_run_step(&ctx.run, 1, "phase-01.accounts")
                .unwrap()
                .status,
            RunStepStatus::Failed
        );
        assert!(!cache.is_run_locked(&ctx.run).unwrap());
    }
}
