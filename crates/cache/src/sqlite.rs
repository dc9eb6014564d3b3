//! SQLite-backed cache store shared by every process pointing at one file.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::{CacheError, CacheItem, CacheItemKey, CacheSearchKey, CacheStore, StorePartition};

/// How long a writer waits for another process's transaction.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn storage_err(prefix: &str, err: impl std::fmt::Display) -> CacheError {
    CacheError::Storage(format!("{prefix}: {err}"))
}

/// [`CacheStore`] persisted in a single SQLite table.
///
/// Items are keyed by partition and the JSON encoding of their key; the
/// network (first path segment) is stored alongside so flushes and searches
/// rooted at a network stay indexed. Test-and-set and read-modify-write go
/// through SQLite itself, so exclusion holds across processes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage_err("create parent dir", e))?;
        }
        let conn = Connection::open(path).map_err(|e| storage_err("open sqlite db", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| storage_err("set journal_mode", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| storage_err("set synchronous", e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| storage_err("set busy_timeout", e))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_items (
                partition TEXT NOT NULL,
                network TEXT NOT NULL,
                item_key TEXT NOT NULL,
                item_value TEXT NOT NULL,
                PRIMARY KEY (partition, item_key)
            );
            CREATE INDEX IF NOT EXISTS idx_cache_items_network
            ON cache_items (partition, network);
            ",
        )
        .map_err(|e| storage_err("ensure schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn encode_key(key: &CacheItemKey) -> Result<String, CacheError> {
    Ok(serde_json::to_string(key)?)
}

fn network_of(key: &CacheItemKey) -> &str {
    key.paths.first().map(String::as_str).unwrap_or_default()
}

fn decode_value(raw: &str) -> Result<serde_json::Value, CacheError> {
    Ok(serde_json::from_str(raw)?)
}

impl CacheStore for SqliteStore {
    fn get_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
    ) -> Result<CacheItem, CacheError> {
        key.validate()?;
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT item_value FROM cache_items WHERE partition = ?1 AND item_key = ?2",
                params![partition.as_str(), encode_key(key)?],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage_err("read item", e))?;
        match raw {
            Some(raw) => Ok(CacheItem::new(key.clone(), decode_value(&raw)?)),
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    fn get_many(
        &self,
        partition: StorePartition,
        search: &CacheSearchKey,
    ) -> Result<Vec<CacheItem>, CacheError> {
        let network = search
            .paths
            .first()
            .filter(|segment| !segment.contains(crate::keyspace::WILDCARD));
        let rows: Vec<(String, String)> = {
            let conn = self.conn.lock();
            let mut statement = conn
                .prepare(
                    "SELECT item_key, item_value FROM cache_items
                     WHERE partition = ?1 AND (?2 IS NULL OR network = ?2)",
                )
                .map_err(|e| storage_err("prepare search", e))?;
            let mapped = statement
                .query_map(params![partition.as_str(), network], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(|e| storage_err("run search", e))?;
            mapped
                .collect::<Result<_, _>>()
                .map_err(|e| storage_err("read search row", e))?
        };

        let mut items = Vec::new();
        for (raw_key, raw_value) in rows {
            let key: CacheItemKey = serde_json::from_str(&raw_key)?;
            if search.matches(&key) {
                items.push(CacheItem::new(key, decode_value(&raw_value)?));
            }
        }
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    fn set_one(
        &self,
        partition: StorePartition,
        item: CacheItem,
    ) -> Result<CacheItem, CacheError> {
        item.key.validate()?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO cache_items (partition, network, item_key, item_value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (partition, item_key) DO UPDATE SET item_value = excluded.item_value",
                params![
                    partition.as_str(),
                    network_of(&item.key),
                    encode_key(&item.key)?,
                    serde_json::to_string(&item.value)?
                ],
            )
            .map_err(|e| storage_err("write item", e))?;
        Ok(item)
    }

    fn set_one_if_absent(
        &self,
        partition: StorePartition,
        item: CacheItem,
    ) -> Result<bool, CacheError> {
        item.key.validate()?;
        let inserted = self
            .conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO cache_items (partition, network, item_key, item_value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    partition.as_str(),
                    network_of(&item.key),
                    encode_key(&item.key)?,
                    serde_json::to_string(&item.value)?
                ],
            )
            .map_err(|e| storage_err("insert item", e))?;
        Ok(inserted == 1)
    }

    fn update_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
        updater: crate::Updater<'_>,
    ) -> Result<CacheItem, CacheError> {
        key.validate()?;
        let encoded = encode_key(key)?;
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| storage_err("begin tx", e))?;
        let raw: String = tx
            .query_row(
                "SELECT item_value FROM cache_items WHERE partition = ?1 AND item_key = ?2",
                params![partition.as_str(), encoded],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage_err("read item", e))?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        // Dropping the transaction without commit rolls back.
        let updated = updater(decode_value(&raw)?)?;
        tx.execute(
            "UPDATE cache_items SET item_value = ?3 WHERE partition = ?1 AND item_key = ?2",
            params![partition.as_str(), encoded, serde_json::to_string(&updated)?],
        )
        .map_err(|e| storage_err("update item", e))?;
        tx.commit().map_err(|e| storage_err("commit tx", e))?;
        Ok(CacheItem::new(key.clone(), updated))
    }

    fn delete_one(
        &self,
        partition: StorePartition,
        key: &CacheItemKey,
    ) -> Result<bool, CacheError> {
        key.validate()?;
        let removed = self
            .conn
            .lock()
            .execute(
                "DELETE FROM cache_items WHERE partition = ?1 AND item_key = ?2",
                params![partition.as_str(), encode_key(key)?],
            )
            .map_err(|e| storage_err("delete item", e))?;
        Ok(removed > 0)
    }

    fn flush_by_partition(
        &self,
        partition: StorePartition,
        network: &str,
    ) -> Result<usize, CacheError> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM cache_items WHERE partition = ?1 AND network = ?2",
                params![partition.as_str(), network],
            )
            .map_err(|e| storage_err("flush partition", e))
    }
}
