use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    CacheError, CacheItem, CacheItemKey, CacheSearchKey, CacheStore, MemoryStore, SqliteStore,
    StorePartition,
};

/// Typed access to a [`CacheStore`].
///
/// Cloning is cheap; clones share the underlying store.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Cache over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Cache over the [`SqliteStore`] at `path`, shared with other processes.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, CacheError> {
        Ok(Self::new(Arc::new(SqliteStore::open(path)?)))
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Remove every item of `network` from each partition in turn.
    pub fn flush_by_network(
        &self,
        network: &str,
    ) -> Result<Vec<(StorePartition, usize)>, CacheError> {
        let counts = self.store.flush_by_network(network)?;
        for (partition, removed) in &counts {
            tracing::info!(network, %partition, removed, "Flushed partition");
        }
        Ok(counts)
    }

    pub fn flush_by_partition(
        &self,
        partition: StorePartition,
        network: &str,
    ) -> Result<usize, CacheError> {
        self.store.flush_by_partition(partition, network)
    }

    pub(crate) fn put<T: Serialize>(
        &self,
        partition: StorePartition,
        key: CacheItemKey,
        value: &T,
    ) -> Result<(), CacheError> {
        self.store
            .set_one(partition, CacheItem::new(key, serde_json::to_value(value)?))?;
        Ok(())
    }

    pub(crate) fn put_if_absent<T: Serialize>(
        &self,
        partition: StorePartition,
        key: CacheItemKey,
        value: &T,
    ) -> Result<bool, CacheError> {
        self.store
            .set_one_if_absent(partition, CacheItem::new(key, serde_json::to_value(value)?))
    }

    pub(crate) fn fetch<T: DeserializeOwned>(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
    ) -> Result<T, CacheError> {
        let item = self.store.get_one(partition, key)?;
        Ok(serde_json::from_value(item.value)?)
    }

    pub(crate) fn fetch_many<T: DeserializeOwned>(
        &self,
        partition: StorePartition,
        search: &CacheSearchKey,
    ) -> Result<Vec<T>, CacheError> {
        self.store
            .get_many(partition, search)?
            .into_iter()
            .map(|item| serde_json::from_value(item.value).map_err(CacheError::from))
            .collect()
    }

    /// Fetch the single item under `search` whose terminal name is `name`.
    pub(crate) fn fetch_by_name<T: DeserializeOwned>(
        &self,
        partition: StorePartition,
        search: &CacheSearchKey,
        name: &str,
    ) -> Result<T, CacheError> {
        let item = self
            .store
            .get_one_from_many(partition, search, &|item| item.key.name() == Some(name))?;
        Ok(serde_json::from_value(item.value)?)
    }

    pub(crate) fn modify<T, F>(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
        f: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T) + Send + Sync,
    {
        let item = self.store.update_one(partition, key, &|value| {
            let mut typed: T = serde_json::from_value(value)?;
            f(&mut typed);
            Ok(serde_json::to_value(&typed)?)
        })?;
        Ok(serde_json::from_value(item.value)?)
    }
}
