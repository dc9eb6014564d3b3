//! Cache store contract and the in-memory backend.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::{CacheError, CacheItem, CacheItemKey, CacheSearchKey, StorePartition};

/// Predicate selecting one item among search results.
pub type Disambiguator<'a> = &'a (dyn Fn(&CacheItem) -> bool + Send + Sync);

/// In-place transformation applied atomically by [`CacheStore::update_one`].
pub type Updater<'a> = &'a (dyn Fn(serde_json::Value) -> Result<serde_json::Value, CacheError>
         + Send
         + Sync);

/// A partitioned key-value store addressed by [`CacheItemKey`].
///
/// Partitions are independent namespaces. Every write is last-writer-wins
/// except [`CacheStore::set_one_if_absent`], which is an atomic test-and-set.
pub trait CacheStore: Send + Sync {
    /// Point lookup.
    fn get_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
    ) -> Result<CacheItem, CacheError>;

    /// All items under `search`, in key order.
    fn get_many(
        &self,
        partition: StorePartition,
        search: &CacheSearchKey,
    ) -> Result<Vec<CacheItem>, CacheError>;

    /// The single item under `search` accepted by `disambiguator`.
    fn get_one_from_many(
        &self,
        partition: StorePartition,
        search: &CacheSearchKey,
        disambiguator: Disambiguator<'_>,
    ) -> Result<CacheItem, CacheError> {
        let mut matches: Vec<CacheItem> = self
            .get_many(partition, search)?
            .into_iter()
            .filter(|item| disambiguator(item))
            .collect();
        match matches.len() {
            0 => Err(CacheError::NotFound(search.to_string())),
            1 => Ok(matches.remove(0)),
            count => Err(CacheError::Ambiguous {
                pattern: search.to_string(),
                count,
            }),
        }
    }

    /// Upsert. Returns the stored item.
    fn set_one(&self, partition: StorePartition, item: CacheItem)
        -> Result<CacheItem, CacheError>;

    /// Store only if no item exists under the key. Returns whether it was stored.
    fn set_one_if_absent(
        &self,
        partition: StorePartition,
        item: CacheItem,
    ) -> Result<bool, CacheError>;

    /// Replace an existing value with `updater(value)` under one write lock.
    fn update_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
        updater: Updater<'_>,
    ) -> Result<CacheItem, CacheError>;

    /// Remove an item. Returns whether it existed.
    fn delete_one(&self, partition: StorePartition, key: &CacheItemKey)
        -> Result<bool, CacheError>;

    /// Remove every item of `network` in one partition. Returns the count removed.
    fn flush_by_partition(
        &self,
        partition: StorePartition,
        network: &str,
    ) -> Result<usize, CacheError>;

    /// Remove every item of `network` in each partition in turn.
    ///
    /// Not atomic across partitions.
    fn flush_by_network(&self, network: &str) -> Result<Vec<(StorePartition, usize)>, CacheError> {
        StorePartition::ALL
            .iter()
            .map(|p| self.flush_by_partition(*p, network).map(|n| (*p, n)))
            .collect()
    }
}

type PartitionMap = BTreeMap<CacheItemKey, serde_json::Value>;

/// In-process [`CacheStore`] with one lock per partition.
#[derive(Debug, Default)]
pub struct MemoryStore {
    infra: RwLock<PartitionMap>,
    monitoring: RwLock<PartitionMap>,
    run: RwLock<PartitionMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, partition: StorePartition) -> &RwLock<PartitionMap> {
        match partition {
            StorePartition::Infra => &self.infra,
            StorePartition::Monitoring => &self.monitoring,
            StorePartition::Run => &self.run,
        }
    }

    /// Number of items held in a partition.
    pub fn len(&self, partition: StorePartition) -> usize {
        self.partition(partition).read().len()
    }

    pub fn is_empty(&self, partition: StorePartition) -> bool {
        self.len(partition) == 0
    }
}

impl CacheStore for MemoryStore {
    fn get_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
    ) -> Result<CacheItem, CacheError> {
        key.validate()?;
        self.partition(partition)
            .read()
            .get(key)
            .map(|value| CacheItem::new(key.clone(), value.clone()))
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    fn get_many(
        &self,
        partition: StorePartition,
        search: &CacheSearchKey,
    ) -> Result<Vec<CacheItem>, CacheError> {
        let guard = self.partition(partition).read();
        Ok(guard
            .iter()
            .filter(|(key, _)| search.matches(key))
            .map(|(key, value)| CacheItem::new(key.clone(), value.clone()))
            .collect())
    }

    fn set_one(
        &self,
        partition: StorePartition,
        item: CacheItem,
    ) -> Result<CacheItem, CacheError> {
        item.key.validate()?;
        self.partition(partition)
            .write()
            .insert(item.key.clone(), item.value.clone());
        Ok(item)
    }

    fn set_one_if_absent(
        &self,
        partition: StorePartition,
        item: CacheItem,
    ) -> Result<bool, CacheError> {
        item.key.validate()?;
        let mut guard = self.partition(partition).write();
        if guard.contains_key(&item.key) {
            return Ok(false);
        }
        guard.insert(item.key, item.value);
        Ok(true)
    }

    fn update_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
        updater: Updater<'_>,
    ) -> Result<CacheItem, CacheError> {
        key.validate()?;
        let mut guard = self.partition(partition).write();
        let current = guard
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        let updated = updater(current)?;
        guard.insert(key.clone(), updated.clone());
        Ok(CacheItem::new(key.clone(), updated))
    }

    fn delete_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
    ) -> Result<bool, CacheError> {
        key.validate()?;
        Ok(self.partition(partition).write().remove(key).is_some())
    }

    fn flush_by_partition(
        &self,
        partition: StorePartition,
        network: &str,
    ) -> Result<usize, CacheError> {
        let mut guard = self.partition(partition).write();
        let before = guard.len();
        guard.retain(|key, _| key.paths.first().map(String::as_str) != Some(network));
        Ok(before - guard.len())
    }
}
