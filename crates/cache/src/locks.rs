//! Run locks and node monitoring locks.
//!
//! A lock is a slot key written with an atomic test-and-set. Locks have no
//! TTL; a holder must release explicitly.

use chainload_types::{NodeMonitoringLock, RunIdentifier, RunLock};
use tracing::debug;

use crate::{keys, Cache, CacheError, StorePartition};

impl Cache {
    /// Take a run lock slot. Returns `false` if the slot is already held.
    pub fn acquire_run_lock(&self, lock: &RunLock) -> Result<bool, CacheError> {
        let acquired = self.put_if_absent(
            StorePartition::Run,
            keys::run_lock(&lock.run, lock.lock_index),
            lock,
        )?;
        debug!(run = %lock.run, lock = %lock.label(), acquired, "Run lock acquire");
        Ok(acquired)
    }

    /// Release a run lock slot. Releasing a free slot is a no-op.
    pub fn release_run_lock(&self, lock: &RunLock) -> Result<(), CacheError> {
        self.store()
            .delete_one(StorePartition::Run, &keys::run_lock(&lock.run, lock.lock_index))?;
        debug!(run = %lock.run, lock = %lock.label(), "Run lock released");
        Ok(())
    }

    /// Check if any slot of the run's lock is held.
    pub fn is_run_locked(&self, run: &RunIdentifier) -> Result<bool, CacheError> {
        Ok(!self
            .store()
            .get_many(StorePartition::Run, &keys::run_locks(run))?
            .is_empty())
    }

    /// Move to the next slot: acquire `lock_index + 1`, then release the old slot.
    ///
    /// Returns the new lock, or `None` if the next slot is held elsewhere, in which
    /// case the old slot is kept.
    pub fn renew_run_lock(&self, lock: &RunLock) -> Result<Option<RunLock>, CacheError> {
        let next = RunLock {
            run: lock.run.clone(),
            lock_index: lock.lock_index + 1,
        };
        if !self.acquire_run_lock(&next)? {
            return Ok(None);
        }
        self.release_run_lock(lock)?;
        Ok(Some(next))
    }

    /// Bind a listener to a node. Returns `false` if another listener holds it.
    pub fn acquire_monitoring_lock(&self, lock: &NodeMonitoringLock) -> Result<bool, CacheError> {
        self.put_if_absent(
            StorePartition::Monitoring,
            keys::monitor_lock(&lock.network, lock.node_index, lock.lock_index),
            lock,
        )
    }

    pub fn release_monitoring_lock(&self, lock: &NodeMonitoringLock) -> Result<(), CacheError> {
        self.store().delete_one(
            StorePartition::Monitoring,
            &keys::monitor_lock(&lock.network, lock.node_index, lock.lock_index),
        )?;
        Ok(())
    }

    pub fn is_node_monitored(&self, network: &str, node_index: u32) -> Result<bool, CacheError> {
        Ok(!self
            .store()
            .get_many(StorePartition::Monitoring, &keys::monitor_locks(network, node_index))?
            .is_empty())
    }
}
