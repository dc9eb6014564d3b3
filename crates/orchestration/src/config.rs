//! Engine configuration.

use backon::ExponentialBuilder;
use chainload_types::Motes;
use std::time::Duration;

/// Backoff policy for deploy submission.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wait before the first retry.
    pub initial_wait: Duration,

    /// Upper bound of a single wait.
    pub max_wait: Duration,

    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_millis(250),
            max_wait: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff doubling from `initial_wait` up to `max_wait`, with one retry
    /// fewer than the total attempts.
    pub fn to_backoff_builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_wait)
            .with_max_delay(self.max_wait)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }
}

/// Workflow engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker tasks executing work items.
    pub workers: usize,

    /// Capacity of the work item queue feeding the workers.
    pub queue_capacity: usize,

    /// Submission retry policy.
    pub retry: RetryPolicy,

    /// Maximum acceptable dispatch-to-finalization latency.
    pub finalization_tolerance: Duration,

    /// Fail a deploy whose finalization latency exceeds the tolerance.
    pub enforce_finalization_tolerance: bool,

    /// Fee reserved when computing refund amounts.
    pub tx_fee: Motes,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 1024,
            retry: RetryPolicy::default(),
            finalization_tolerance: Duration::from_secs(120),
            enforce_finalization_tolerance: false,
            tx_fee: 10,
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the submission retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the finalization tolerance.
    pub fn with_finalization_tolerance(mut self, tolerance: Duration) -> Self {
        self.finalization_tolerance = tolerance;
        self
    }

    pub fn with_enforced_tolerance(mut self, enforce: bool) -> Self {
        self.enforce_finalization_tolerance = enforce;
        self
    }

    /// Set the transaction fee.
    pub fn with_tx_fee(mut self, fee: Motes) -> Self {
        self.tx_fee = fee;
        self
    }

    pub(crate) fn tolerance_ms(&self) -> i64 {
        i64::try_from(self.finalization_tolerance.as_millis()).unwrap_or(i64::MAX)
    }
}
