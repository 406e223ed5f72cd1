//! # query-cache-kit
//!
//! A cache-aside query layer for SQL backing stores.
//!
//! ## Features
//!
//! - **Automatic keys:** cache keys derived from the statement and its
//!   parameters (table, sorted `WHERE` columns, parameter hash)
//! - **Automatic invalidation:** writes delete `{table}_*` and `{table}:*`, or
//!   whatever per-table rules say
//! - **Resilient cache store:** reconnects forever with backoff; a cache outage
//!   degrades to direct reads and never fails a query
//! - **Bounded retry:** transient backing-store errors are retried with
//!   exponential backoff, everything else surfaces immediately
//! - **Transactions:** invalidation is buffered and applied once, after commit
//! - **Backend agnostic:** in-memory and Redis cache stores, any SQL driver
//!   through the [`BackingStore`] trait
//!
//! ## Quick Start
//!
//! ```
//! use query_cache_kit::{
//!     backend::InMemoryBackend,
//!     config::{QueryCacheConfig, ReadOptions, WriteOptions},
//!     store::{QueryResult, ScriptedStore},
//!     QueryCache,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> query_cache_kit::Result<()> {
//! // Any BackingStore works; ScriptedStore answers from a closure.
//! let store = ScriptedStore::new(|sql, _params| {
//!     if sql.starts_with("SELECT") {
//!         Ok(QueryResult::rows(vec![json!({"id": 123, "status": "active"})]))
//!     } else {
//!         Ok(QueryResult::affected(1))
//!     }
//! });
//!
//! let cache = QueryCache::builder(store, InMemoryBackend::new())
//!     .with_config(QueryCacheConfig::default().with_namespace("shop"))
//!     .build();
//!
//! // Cached under shop:orders:status:user_id:{hash}
//! let orders = cache
//!     .read(
//!         "SELECT * FROM orders WHERE user_id = ? AND status = ?",
//!         &[json!(123), json!("active")],
//!         ReadOptions::default(),
//!     )
//!     .await?;
//! assert_eq!(orders.len(), 1);
//!
//! // Deletes shop:orders_* and shop:orders:* once the update completed
//! cache
//!     .write("UPDATE orders SET status = ? WHERE id = ?", &[json!("shipped"), json!(9)], WriteOptions::default())
//!     .await?;
//!
//! cache.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod observability;
pub mod page;
pub mod resilience;
pub mod retry;
pub mod serialization;
pub mod service;
pub mod sql;
pub mod store;
pub mod strategy;
pub mod transaction;

/// A result row as returned by the backing store.
pub type Row = serde_json::Value;

pub use backend::CacheBackend;
pub use config::{
    BulkInsertOptions, BulkInsertResult, ConfigureOptions, QueryCacheConfig, ReadOptions,
    WriteOptions,
};
pub use error::{Error, Result};
pub use invalidation::{InvalidationPlanner, InvalidationRules};
pub use key::{KeyGenerator, KeyOptions};
pub use page::{PageIndex, PageResult};
pub use resilience::{ConnectionState, ResilienceConfig, ResilientCache};
pub use retry::{RetryExecutor, RetryPolicy};
pub use service::{QueryCache, QueryCacheBuilder};
pub use store::{BackingStore, Connection, PoolStats, QueryResult};
pub use strategy::KeyStrategy;
pub use transaction::{Transaction, TransactionState};

/// Version of query-cache-kit
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
