//! Run-state cache for chainload.
//!
//! All coordination between workers, listeners and the workflow engine goes
//! through this cache. It has three layers:
//!
//! - [`keyspace`]: hierarchical keys, search patterns and partitions
//! - [`CacheStore`]: the partitioned key-value contract, with [`MemoryStore`]
//!   for one process and [`SqliteStore`] for processes sharing a file
//! - [`Cache`]: typed operations over domain entities, including run locks
//!
//! # Layout
//!
//! ```text
//! INFRA       lrt1:network
//!             lrt1:node:N-0001
//!             lrt1:named-key:A-000002:COUNTER_DEFINE:counter
//! RUN         lrt1:account:WG-100:R-001:A-000001
//!             lrt1:deploy:WG-100:R-001:A-000001:<hash>
//!             lrt1:transfer:WG-100:R-001:A-000001:<hash>
//!             lrt1:run:WG-100:R-001
//!             lrt1:run-step:WG-100:R-001:I-0001:phase-01.fund-faucet
//!             lrt1:lock:WG-100:R-001:L-001
//! MONITORING  lrt1:event:deploy_finalized:<hash>
//!             lrt1:monitor-lock:N-0001:L-001
//! ```

mod cache;
mod error;
mod infra;
pub mod keys;
pub mod keyspace;
mod locks;
mod monitoring;
mod run;
mod sqlite;
mod store;

pub use cache::Cache;
pub use error::CacheError;
pub use keyspace::{CacheItem, CacheItemKey, CacheSearchKey, StorePartition};
pub use sqlite::SqliteStore;
pub use store::{CacheStore, Disambiguator, MemoryStore, Updater};
