//! Progress tracking for a single running step.
//!
//! Pure bookkeeping: the engine feeds worker reports and deploy
//! notifications in, and acts on the returned [`StepSignal`]. No I/O happens
//! here.

use std::collections::HashSet;

use crate::{Completion, VerificationError, WorkOutcome};

/// What the engine should do after an input was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSignal {
    /// Keep waiting.
    Pending,
    /// Every item resolved; run the step's aggregate verification.
    ReadyToVerify,
    /// The step cannot succeed.
    Failed(String),
}

/// Resolution state of one step within one pass.
#[derive(Debug)]
pub struct StepProgress {
    label: String,
    loop_index: u32,
    completion: Completion,

    /// Items handed to the pool; unknown until the feeder drained the sequence.
    dispatched: Option<usize>,

    /// Items resolved without a finalization (skips, or dispatch completions).
    resolved_directly: usize,

    /// Deploy hashes whose worker finished bookkeeping.
    reported: HashSet<String>,

    /// Deploy hashes observed finalized for this step.
    finalized: HashSet<String>,

    failure: Option<String>,

    /// Set once a terminal signal was handed out.
    settled: bool,
}

impl StepProgress {
    pub fn new(label: impl Into<String>, loop_index: u32, completion: Completion) -> Self {
        Self {
            label: label.into(),
            loop_index,
            completion,
            dispatched: None,
            resolved_directly: 0,
            reported: HashSet::new(),
            finalized: HashSet::new(),
            failure: None,
            settled: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn loop_index(&self) -> u32 {
        self.loop_index
    }

    /// Check whether an event addresses this step.
    pub fn is_for(&self, label: &str, loop_index: u32) -> bool {
        self.label == label && self.loop_index == loop_index
    }

    /// Items resolved so far. A deploy counts once it is both reported and finalized.
    pub fn resolved(&self) -> usize {
        self.resolved_directly
            + self
                .finalized
                .iter()
                .filter(|hash| self.reported.contains(*hash))
                .count()
    }

    pub fn dispatched(&self) -> Option<usize> {
        self.dispatched
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// The feeder handed `count` items to the pool.
    pub fn on_dispatch_complete(&mut self, count: usize) -> StepSignal {
        self.dispatched = Some(count);
        self.signal()
    }

    /// A worker reported the outcome of one item.
    pub fn on_work_reported(&mut self, outcome: &WorkOutcome) -> StepSignal {
        match (outcome, self.completion) {
            (WorkOutcome::Failed { reason }, _) => self.fail(reason.clone()),
            (WorkOutcome::Done { deploy_hash: Some(hash) }, Completion::OnFinalization) => {
                self.reported.insert(hash.clone());
            }
            (WorkOutcome::Skipped { .. }, _) | (WorkOutcome::Done { .. }, _) => {
                self.resolved_directly += 1;
            }
        }
        self.signal()
    }

    /// A deploy of this step was finalized and checked.
    ///
    /// Repeated reports of the same hash resolve the item once.
    pub fn on_deploy_finalized(
        &mut self,
        deploy_hash: &str,
        check: Result<(), VerificationError>,
    ) -> StepSignal {
        if self.completion != Completion::OnFinalization {
            return StepSignal::Pending;
        }
        if let Err(e) = check {
            self.fail(e.to_string());
        } else {
            self.finalized.insert(deploy_hash.to_string());
        }
        self.signal()
    }

    /// A deploy of this step was discarded by the chain.
    pub fn on_deploy_discarded(&mut self, deploy_hash: &str) -> StepSignal {
        self.fail(VerificationError::Discarded(deploy_hash.to_string()).to_string());
        self.signal()
    }

    fn fail(&mut self, reason: String) {
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
    }

    fn signal(&mut self) -> StepSignal {
        if self.settled {
            return StepSignal::Pending;
        }
        if let Some(reason) = &self.failure {
            self.settled = true;
            return StepSignal::Failed(reason.clone());
        }
        if self.dispatched == Some(self.resolved()) {
            self.settled = true;
            return StepSignal::ReadyToVerify;
        }
        StepSignal::Pending
    }
}
