//! High-level query cache service.
//!
//! [`QueryCache`] is the public entry point. It is `Clone` (one `Arc`
//! increment) and can be shared across tasks without extra locking.
//!
//! # Flow
//!
//! ```text
//! read   ─▶ key (supplied or derived) ─▶ cache lookup ─┬─ hit ─▶ rows
//!                                                      └─ miss ─▶ retry executor ─▶ cache set ─▶ rows
//! write  ─▶ retry executor ─▶ invalidation planner ─▶ delete by prefix
//! ```
//!
//! Inside a [`Transaction`] writes buffer their patterns and the delete step
//! runs once, after commit.

use crate::backend::CacheBackend;
use crate::config::{
    BulkInsertOptions, BulkInsertResult, CacheSettings, ConfigureOptions, QueryCacheConfig,
    ReadOptions, WriteOptions,
};
use crate::error::{Error, Result};
use crate::key::{KeyGenerator, KeyOptions};
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::page::{self, PageIndex, PageResult};
use crate::resilience::ResilientCache;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::sql;
use crate::store::{BackingStore, Connection, PoolStats, QueryResult};
use crate::transaction::Transaction;
use crate::Row;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// State shared by a `QueryCache` and the transactions it opens.
pub(crate) struct Inner<S: BackingStore, B: CacheBackend> {
    store: S,
    targets: HashMap<String, S>,
    pub(crate) cache: ResilientCache<B>,
    pub(crate) retry: RetryExecutor,
    settings: RwLock<Arc<CacheSettings>>,
    cache_enabled: bool,
    ttl_policy: TtlPolicy,
    retry_policy: RetryPolicy,
    pub(crate) metrics: Arc<dyn CacheMetrics>,
}

impl<S: BackingStore, B: CacheBackend> Inner<S, B> {
    /// Current settings snapshot. Calls keep the snapshot they started with.
    pub(crate) fn settings(&self) -> Arc<CacheSettings> {
        Arc::clone(&self.settings.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn store(&self, target: Option<&str>) -> Result<&S> {
        match target {
            None => Ok(&self.store),
            Some(name) => self
                .targets
                .get(name)
                .ok_or_else(|| Error::Config(format!("Unknown backing store target: {}", name))),
        }
    }

    fn policy(&self, timeout: Option<Duration>) -> RetryPolicy {
        match timeout {
            Some(timeout) => self.retry_policy.clone().with_timeout(timeout),
            None => self.retry_policy.clone(),
        }
    }

    /// Cache key for a read, or `None` when the read bypasses the cache.
    pub(crate) fn read_key(
        &self,
        settings: &CacheSettings,
        statement: &str,
        params: &[Value],
        opts: &ReadOptions,
    ) -> Option<String> {
        if !self.cache_enabled {
            return None;
        }
        if let Some(key) = &opts.key {
            return Some(key.clone());
        }
        if !settings.auto_key_enabled {
            return None;
        }
        let strategy = opts.strategy.unwrap_or(settings.key_strategy);
        Some(KeyGenerator::generate(
            statement,
            params,
            &KeyOptions::default().with_strategy(strategy),
        ))
    }

    /// Per-call TTL, else the policy's TTL for the statement's table.
    pub(crate) fn ttl_for(&self, statement: &str, opts: &ReadOptions) -> Option<Duration> {
        opts.ttl.or_else(|| {
            self.ttl_policy
                .get_ttl(sql::extract_table(statement).as_deref())
        })
    }

    /// Execute one statement on a pooled connection under the retry policy.
    async fn run(
        &self,
        store: &S,
        policy: &RetryPolicy,
        statement: &str,
        params: &[Value],
    ) -> Result<QueryResult> {
        self.retry
            .run(policy, || async move {
                let mut conn = store.acquire().await?;
                let result = conn.execute(statement, params).await;
                conn.release();
                result
            })
            .await
    }

    /// Cache-aside: return the cached value for `key` or load and cache it.
    ///
    /// Without a key the loader runs directly. Cache failures never surface;
    /// loader errors always do.
    pub(crate) async fn cached<T, F, Fut>(
        &self,
        key: Option<String>,
        ttl: Option<Duration>,
        load: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(key) = key else {
            return load().await;
        };

        let started = Instant::now();
        if let Some(hit) = self.cache.lookup::<T>(&key).await {
            self.metrics.record_hit(&key, started.elapsed());
            return Ok(hit);
        }

        let value = load().await?;
        self.metrics.record_miss(&key, started.elapsed());
        Ok(self.cache.set(&key, value, ttl).await)
    }

    /// Delete everything matching `patterns`.
    pub(crate) async fn invalidate(&self, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        self.metrics.record_invalidation(patterns);
        self.cache.delete_by_prefix(patterns).await;
    }
}

/// Cache-aside query layer over a backing store and a cache store.
///
/// Must be built inside a Tokio runtime (the cache store's reconnect
/// supervisor is spawned at construction).
///
/// # Example
///
/// ```
/// use query_cache_kit::backend::InMemoryBackend;
/// use query_cache_kit::config::{ReadOptions, WriteOptions};
/// use query_cache_kit::store::{QueryResult, ScriptedStore};
/// use query_cache_kit::QueryCache;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> query_cache_kit::Result<()> {
/// let store = ScriptedStore::new(|sql, _| {
///     if sql.starts_with("SELECT") {
///         Ok(QueryResult::rows(vec![json!({"id": 1, "name": "Alice"})]))
///     } else {
///         Ok(QueryResult::affected(1))
///     }
/// });
/// let cache = QueryCache::new(store.clone(), InMemoryBackend::new());
///
/// let sql = "SELECT * FROM users WHERE id = ?";
/// let rows = cache.read(sql, &[json!(1)], ReadOptions::default()).await?;
/// let again = cache.read(sql, &[json!(1)], ReadOptions::default()).await?;
/// assert_eq!(rows, again);
///
/// cache
///     .write("UPDATE users SET name = ? WHERE id = ?", &[json!("Bob"), json!(1)], WriteOptions::default())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct QueryCache<S: BackingStore, B: CacheBackend> {
    inner: Arc<Inner<S, B>>,
}

impl<S: BackingStore, B: CacheBackend> Clone for QueryCache<S, B> {
    fn clone(&self) -> Self {
        QueryCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: BackingStore, B: CacheBackend> QueryCache<S, B> {
    /// Create a query cache with default configuration.
    pub fn new(store: S, backend: B) -> Self {
        QueryCache::builder(store, backend).build()
    }

    pub fn builder(store: S, backend: B) -> QueryCacheBuilder<S, B> {
        QueryCacheBuilder::new(store, backend)
    }

    /// Run a read statement through the cache.
    ///
    /// The cache is bypassed when caching is disabled, or when no key is
    /// supplied and automatic keys are off.
    ///
    /// # Errors
    /// - `Error::ShuttingDown` after [`shutdown`](Self::shutdown)
    /// - `Error::Config` for an unknown target
    /// - backing store errors (after retries) and timeouts
    pub async fn read(&self, statement: &str, params: &[Value], opts: ReadOptions) -> Result<Vec<Row>> {
        self.inner.retry.ensure_running()?;
        let settings = self.inner.settings();
        let store = self.inner.store(opts.target.as_deref())?;
        let key = self.inner.read_key(&settings, statement, params, &opts);
        let ttl = self.inner.ttl_for(statement, &opts);
        let policy = self.inner.policy(opts.timeout);

        self.inner
            .cached(key, ttl, || async {
                self.inner
                    .run(store, &policy, statement, params)
                    .await
                    .map(|result| result.rows)
            })
            .await
    }

    /// Run a read statement one page at a time.
    ///
    /// `page` is zero-based and normalised by [`PageIndex`]. The page is
    /// cached under `{key}:page:{page}:{page_size}` as a [`PageResult`].
    ///
    /// # Errors
    /// `Error::InvalidArgument` when `page_size <= 0`, otherwise as [`read`](Self::read).
    pub async fn read_paginated(
        &self,
        statement: &str,
        params: &[Value],
        page: impl Into<PageIndex>,
        page_size: i64,
        opts: ReadOptions,
    ) -> Result<PageResult> {
        self.inner.retry.ensure_running()?;
        let page_size = page::validate_page_size(page_size)?;
        let page = page.into().get();
        let settings = self.inner.settings();
        let store = self.inner.store(opts.target.as_deref())?;
        let key = self
            .inner
            .read_key(&settings, statement, params, &opts)
            .map(|base| {
                KeyGenerator::build_composite(&[
                    &base,
                    "page",
                    &page.to_string(),
                    &page_size.to_string(),
                ])
            });
        let ttl = self.inner.ttl_for(statement, &opts);
        let policy = self.inner.policy(opts.timeout);
        let count_sql = page::count_statement(statement);
        let page_sql = page::page_statement(statement, page, page_size);

        self.inner
            .cached(key, ttl, || async {
                let counted = self.inner.run(store, &policy, &count_sql, params).await?;
                let total_count = page::total_from_rows(&counted.rows);
                let detail = self
                    .inner
                    .run(store, &policy, &page_sql, params)
                    .await?
                    .rows;
                Ok(PageResult {
                    total_count,
                    page_count: page::page_count(total_count, page_size),
                    detail,
                })
            })
            .await
    }

    /// Run a write statement, then invalidate the affected cache entries.
    ///
    /// Invalidation starts only after the statement completed successfully.
    /// Manual patterns in `opts` replace the planned ones.
    pub async fn write(&self, statement: &str, params: &[Value], opts: WriteOptions) -> Result<QueryResult> {
        self.inner.retry.ensure_running()?;
        let store = self.inner.store(opts.target.as_deref())?;
        let policy = self.inner.policy(opts.timeout);

        let result = self.inner.run(store, &policy, statement, params).await?;

        let patterns = self
            .inner
            .settings()
            .planner
            .plan(statement, opts.patterns.as_deref());
        self.inner.invalidate(&patterns).await;
        Ok(result)
    }

    /// Insert `records` in chunks of multi-row `INSERT` statements.
    ///
    /// Columns come from the first record; missing values in later records
    /// are inserted as `NULL`. Invalidation runs once, after the last chunk,
    /// or after the failing chunk when earlier chunks were already written.
    ///
    /// # Errors
    /// `Error::InvalidArgument`, before anything is written, when a record is
    /// not a JSON object, the first record has no fields, a later record has
    /// a field the first one lacks, or the table name is empty. A failing
    /// chunk returns its error; earlier chunks stay written.
    pub async fn bulk_insert(
        &self,
        table: &str,
        records: &[Row],
        opts: BulkInsertOptions,
    ) -> Result<BulkInsertResult> {
        self.inner.retry.ensure_running()?;
        if records.is_empty() {
            return Ok(BulkInsertResult::default());
        }
        if table.trim().is_empty() {
            return Err(Error::InvalidArgument("table name is empty".to_string()));
        }
        let store = self.inner.store(opts.target.as_deref())?;
        let columns: Vec<String> = match &records[0] {
            Value::Object(map) if !map.is_empty() => map.keys().cloned().collect(),
            _ => {
                return Err(Error::InvalidArgument(
                    "bulk insert records must be non-empty objects".to_string(),
                ))
            }
        };
        for (index, record) in records.iter().enumerate().skip(1) {
            let Value::Object(map) = record else {
                return Err(Error::InvalidArgument(format!(
                    "bulk insert record {} is not an object",
                    index
                )));
            };
            if let Some(extra) = map.keys().find(|k| !columns.contains(*k)) {
                return Err(Error::InvalidArgument(format!(
                    "bulk insert record {} has column `{}` missing from the first record",
                    index, extra
                )));
            }
        }

        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));
        let insert_head = format!("INSERT INTO {} ({}) VALUES ", quote_identifier(table), column_list);

        let manual = opts.reset_pattern.map(|p| vec![p]);
        let patterns = self
            .inner
            .settings()
            .planner
            .plan(&insert_head, manual.as_deref());

        let mut result = BulkInsertResult::default();
        for chunk in records.chunks(opts.chunk_size.max(1)) {
            let mut params = Vec::with_capacity(chunk.len() * columns.len());
            for record in chunk {
                params.extend(
                    columns
                        .iter()
                        .map(|c| record.get(c).cloned().unwrap_or(Value::Null)),
                );
            }
            let statement = format!(
                "{}{}",
                insert_head,
                vec![row_placeholder.as_str(); chunk.len()].join(", ")
            );

            let inserted = match self
                .inner
                .run(store, &self.inner.retry_policy, &statement, &params)
                .await
            {
                Ok(inserted) => inserted,
                Err(e) => {
                    if result.chunks > 0 {
                        warn!(
                            "Bulk insert into {} failed after {} chunks: {}",
                            table, result.chunks, e
                        );
                        self.inner.invalidate(&patterns).await;
                    }
                    return Err(e);
                }
            };
            result.inserted_rows += inserted.affected_rows;
            result.chunks += 1;
            debug!(
                "Bulk insert into {}: chunk {} ({} rows)",
                table,
                result.chunks,
                chunk.len()
            );
        }

        self.inner.invalidate(&patterns).await;

        info!(
            "✓ Bulk insert into {}: {} rows in {} chunks",
            table, result.inserted_rows, result.chunks
        );
        Ok(result)
    }

    /// Run `f` inside a transaction on the default store.
    ///
    /// Commits and flushes the deduplicated invalidation buffer when `f`
    /// succeeds. Rolls back and discards the buffer when it fails; a rollback
    /// error is logged and the original error returned.
    ///
    /// ```
    /// # use query_cache_kit::backend::InMemoryBackend;
    /// # use query_cache_kit::store::{QueryResult, ScriptedStore};
    /// # use query_cache_kit::QueryCache;
    /// # use serde_json::json;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> query_cache_kit::Result<()> {
    /// # let cache = QueryCache::new(ScriptedStore::new(|_, _| Ok(QueryResult::affected(1))), InMemoryBackend::new());
    /// let moved = cache
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.query("UPDATE accounts SET balance = balance - ? WHERE id = ?", &[json!(10), json!(1)]).await?;
    ///             tx.query("UPDATE accounts SET balance = balance + ? WHERE id = ?", &[json!(10), json!(2)]).await?;
    ///             Ok(10)
    ///         })
    ///     })
    ///     .await?;
    /// assert_eq!(moved, 10);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction<S, B>) -> BoxFuture<'t, Result<T>>,
    {
        self.transaction_on(None, f).await
    }

    /// [`transaction`](Self::transaction) on a named target.
    pub async fn transaction_on<T, F>(&self, target: Option<&str>, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction<S, B>) -> BoxFuture<'t, Result<T>>,
    {
        let mut tx = self.begin_on(target).await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Rollback failed after error ({}): {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Open a transaction on the default store for manual commit/rollback.
    pub async fn begin(&self) -> Result<Transaction<S, B>> {
        self.begin_on(None).await
    }

    /// Open a transaction on a named target.
    pub async fn begin_on(&self, target: Option<&str>) -> Result<Transaction<S, B>> {
        self.inner.retry.ensure_running()?;
        let store = self.inner.store(target)?;
        let mut conn = self
            .inner
            .retry
            .run(&self.inner.retry_policy, || store.acquire())
            .await?;
        if let Err(e) = conn.begin().await {
            conn.release();
            return Err(e);
        }
        debug!("Transaction started");
        Ok(Transaction::new(
            Arc::clone(&self.inner),
            self.inner.settings(),
            conn,
        ))
    }

    /// Cached rows for `key`; `[]` on miss or when the cache store is down.
    pub async fn get(&self, key: &str) -> Vec<Row> {
        self.inner.cache.get(key).await
    }

    /// Cache `rows` under `key`; `ttl` defaults to the TTL policy.
    pub async fn set(&self, key: &str, rows: Vec<Row>, ttl: Option<Duration>) -> Vec<Row> {
        let ttl = ttl.or_else(|| self.inner.ttl_policy.get_ttl(None));
        self.inner.cache.set(key, rows, ttl).await
    }

    pub async fn delete<K: AsRef<str>>(&self, keys: &[K]) {
        self.inner.cache.delete(keys).await
    }

    /// Delete every key matching each glob pattern; returns the count deleted.
    pub async fn delete_by_prefix<P: AsRef<str>>(&self, patterns: &[P]) -> usize {
        self.inner.cache.delete_by_prefix(patterns).await
    }

    /// Whether the cache store connection is ready.
    pub fn is_healthy(&self) -> bool {
        self.inner.cache.is_healthy()
    }

    /// Pool counters of the default store or a named target.
    pub fn pool_stats(&self, target: Option<&str>) -> Result<PoolStats> {
        Ok(self.inner.store(target)?.pool_stats())
    }

    /// Replace the key and invalidation settings.
    ///
    /// Calls already in flight keep the snapshot they started with.
    pub fn configure(&self, options: ConfigureOptions) {
        let mut guard = self
            .inner
            .settings
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let next = guard.reconfigured(options);
        info!(
            "Query cache reconfigured (auto keys: {}, auto invalidation: {}, rules: {})",
            next.auto_key_enabled,
            next.planner.is_enabled(),
            next.planner.rules().len()
        );
        *guard = Arc::new(next);
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Arc<CacheSettings> {
        self.inner.settings()
    }

    /// Reject new calls, close every store and stop the cache connection.
    ///
    /// Calls already past their shutdown check finish normally. Every store is
    /// closed even if one fails; the first close error is returned.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.retry.shutdown();
        info!("Query cache shutting down");

        let mut first_error = None;
        let stores = std::iter::once(&self.inner.store).chain(self.inner.targets.values());
        for store in stores {
            if let Err(e) = store.close().await {
                error!("Failed to close backing store: {}", e);
                first_error.get_or_insert(e);
            }
        }
        self.inner.cache.close();

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("✓ Query cache shut down");
                Ok(())
            }
        }
    }

    /// The resilient cache client, for direct use.
    pub fn cache(&self) -> &ResilientCache<B> {
        &self.inner.cache
    }
}

/// Builder for [`QueryCache`].
pub struct QueryCacheBuilder<S: BackingStore, B: CacheBackend> {
    store: S,
    backend: B,
    targets: HashMap<String, S>,
    config: QueryCacheConfig,
    metrics: Arc<dyn CacheMetrics>,
}

impl<S: BackingStore, B: CacheBackend> QueryCacheBuilder<S, B> {
    pub fn new(store: S, backend: B) -> Self {
        QueryCacheBuilder {
            store,
            backend,
            targets: HashMap::new(),
            config: QueryCacheConfig::default(),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    pub fn with_config(mut self, config: QueryCacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a named backing store selectable through `target` options.
    pub fn with_target(mut self, name: impl Into<String>, store: S) -> Self {
        self.targets.insert(name.into(), store);
        self
    }

    pub fn with_metrics(mut self, metrics: impl CacheMetrics + 'static) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    /// Build the query cache and start connecting to the cache store.
    pub fn build(self) -> QueryCache<S, B> {
        let config = self.config;
        let cache = ResilientCache::new(self.backend, config.resilience.clone())
            .with_metrics(Arc::clone(&self.metrics));

        info!(
            "✓ Query cache created (cache enabled: {}, targets: {})",
            config.cache_enabled,
            self.targets.len()
        );

        QueryCache {
            inner: Arc::new(Inner {
                store: self.store,
                targets: self.targets,
                cache,
                retry: RetryExecutor::new(),
                settings: RwLock::new(Arc::new(config.settings())),
                cache_enabled: config.cache_enabled,
                ttl_policy: config.ttl_policy,
                retry_policy: config.retry,
                metrics: self.metrics,
            }),
        }
    }
}

/// Backtick-quote an identifier, quoting each part of `schema.table`.
fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("`{}`", part.trim().replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::resilience::ResilienceConfig;
    use crate::store::ScriptedStore;
    use serde_json::json;

    fn users_store() -> ScriptedStore {
        ScriptedStore::new(|sql, _| {
            if sql.starts_with("SELECT COUNT") {
                Ok(QueryResult::rows(vec![json!({"total": 3})]))
            } else if sql.starts_with("SELECT") {
                Ok(QueryResult::rows(vec![json!({"id": 1}), json!({"id": 2})]))
            } else {
                Ok(QueryResult::affected(1))
            }
        })
    }

    async fn ready(cache: QueryCache<ScriptedStore, InMemoryBackend>) -> QueryCache<ScriptedStore, InMemoryBackend> {
        assert!(cache.cache().wait_ready(Duration::from_secs(1)).await);
        cache
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("app.users"), "`app`.`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[tokio::test]
    async fn test_read_miss_then_hit() {
        let store = users_store();
        let cache = ready(QueryCache::new(store.clone(), InMemoryBackend::new())).await;

        let sql = "SELECT * FROM users WHERE id = ?";
        let first = cache.read(sql, &[json!(1)], ReadOptions::default()).await.expect("read");
        let second = cache.read(sql, &[json!(1)], ReadOptions::default()).await.expect("read");

        assert_eq!(first, second);
        assert_eq!(store.count_matching("SELECT"), 1);
        assert_eq!(store.acquired(), store.released());
    }

    #[tokio::test]
    async fn test_supplied_key_used_verbatim() {
        let backend = InMemoryBackend::new();
        let cache = ready(QueryCache::new(users_store(), backend.clone())).await;

        cache
            .read("SELECT * FROM users", &[], ReadOptions::default().with_key("my:key"))
            .await
            .expect("read");

        assert!(backend.get("my:key").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_unknown_target_is_config_error() {
        let cache = QueryCache::new(users_store(), InMemoryBackend::new());
        let err = cache
            .read("SELECT 1", &[], ReadOptions::default().with_target("replica"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(cache.pool_stats(Some("replica")).is_err());
    }

    #[tokio::test]
    async fn test_named_target_receives_statement() {
        let primary = users_store();
        let reporting = users_store();
        let cache = QueryCache::builder(primary.clone(), InMemoryBackend::new())
            .with_target("reporting", reporting.clone())
            .build();

        cache
            .write("DELETE FROM users WHERE id = ?", &[json!(1)], WriteOptions::default().with_target("reporting"))
            .await
            .expect("write");

        assert!(primary.executed().is_empty());
        assert_eq!(reporting.count_matching("DELETE"), 1);
    }

    #[tokio::test]
    async fn test_ttl_override_beats_policy() {
        let cache = QueryCache::builder(users_store(), InMemoryBackend::new())
            .with_config(
                QueryCacheConfig::default().with_ttl_policy(TtlPolicy::Fixed(Duration::from_secs(5))),
            )
            .build();

        let opts = ReadOptions::default().with_ttl(Duration::from_secs(60));
        assert_eq!(
            cache.inner.ttl_for("SELECT * FROM users", &opts),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            cache.inner.ttl_for("SELECT * FROM users", &ReadOptions::default()),
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_read_paginated_key_and_shape() {
        let backend = InMemoryBackend::new();
        let store = users_store();
        let cache = ready(
            QueryCache::builder(store.clone(), backend.clone())
                .with_config(
                    QueryCacheConfig::default()
                        .with_resilience(ResilienceConfig::default().with_namespace("app")),
                )
                .build(),
        )
        .await;

        let page = cache
            .read_paginated("SELECT * FROM users;", &[], 1, 2, ReadOptions::default())
            .await
            .expect("page");

        assert_eq!(page.total_count, 3);
        assert_eq!(page.page_count, 2);
        assert_eq!(page.detail.len(), 2);
        assert!(backend
            .get("app:users:all:page:1:2")
            .await
            .expect("get")
            .is_some());
        let executed = store.executed();
        assert_eq!(executed[1].sql, "SELECT * FROM users LIMIT 2, 2");
    }
}
