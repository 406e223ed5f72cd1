//! Backing store abstraction.
//!
//! The relational store is consumed through two small traits: a pool that
//! hands out connections and a connection that executes parameterised
//! statements. Adapters for SQLx, mysql_async or any other driver implement
//! them outside this crate; [`ScriptedStore`] is an in-memory implementation
//! for tests and examples.
//!
//! # Connection discipline
//!
//! A connection goes back to the pool when it is dropped. [`Connection::release`]
//! is the explicit form of the same thing and consumes the connection, so a
//! connection can never be released twice.
//!
//! # Error Handling
//!
//! Implementations should return [`Error::Query`] with the driver's error code
//! so the retry executor can tell transient connectivity failures
//! (`ECONNREFUSED`, `PROTOCOL_CONNECTION_LOST`, ...) from query errors.

use crate::error::{Error, Result};
use crate::Row;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Outcome of one statement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    /// Result rows (empty for writes).
    pub rows: Vec<Row>,
    /// Rows changed by a write.
    pub affected_rows: u64,
    /// Auto-increment id of the last inserted row, when the driver reports one.
    pub last_insert_id: Option<u64>,
}

impl QueryResult {
    pub fn rows(rows: Vec<Row>) -> Self {
        QueryResult {
            rows,
            ..Default::default()
        }
    }

    pub fn affected(affected_rows: u64) -> Self {
        QueryResult {
            affected_rows,
            ..Default::default()
        }
    }
}

/// Connection pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently open.
    pub total: usize,
    /// Open connections not checked out.
    pub free: usize,
    /// Callers waiting for a connection.
    pub queued: usize,
}

/// A checked-out backing store connection.
#[allow(async_fn_in_trait)]
pub trait Connection: Send {
    /// Execute a parameterised statement.
    ///
    /// # Errors
    /// Returns `Error::Query` with the driver code on failure.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Start a transaction on this connection.
    async fn begin(&mut self) -> Result<()> {
        self.execute("START TRANSACTION", &[]).await.map(|_| ())
    }

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Return the connection to its pool.
    fn release(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// A pool of backing store connections.
#[allow(async_fn_in_trait)]
pub trait BackingStore: Send + Sync + 'static {
    type Conn: Connection;

    /// Check out a connection.
    ///
    /// # Errors
    /// Returns `Error::Query` (usually with a transient code) when the store
    /// is unreachable or the pool is exhausted.
    async fn acquire(&self) -> Result<Self::Conn>;

    /// Current pool counters.
    fn pool_stats(&self) -> PoolStats;

    /// Close the pool. Connections already checked out finish normally.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Scripted Test Store
// ============================================================================

type Handler = dyn Fn(&str, &[Value]) -> Result<QueryResult> + Send + Sync;

/// A statement seen by a [`ScriptedStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub in_transaction: bool,
}

#[derive(Default)]
struct ScriptedState {
    executed: Mutex<Vec<ExecutedStatement>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    closed: AtomicBool,
}

/// In-memory [`BackingStore`] answering every statement with a handler closure.
///
/// Records each executed statement and counts acquires, releases and
/// transaction calls, which makes it suitable for asserting call ordering in
/// tests.
///
/// ```
/// use query_cache_kit::store::{BackingStore, Connection, QueryResult, ScriptedStore};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> query_cache_kit::Result<()> {
/// let store = ScriptedStore::new(|sql, _params| {
///     if sql.starts_with("SELECT") {
///         Ok(QueryResult::rows(vec![json!({"id": 1})]))
///     } else {
///         Ok(QueryResult::affected(1))
///     }
/// });
///
/// let mut conn = store.acquire().await?;
/// let result = conn.execute("SELECT * FROM users", &[]).await?;
/// conn.release();
///
/// assert_eq!(result.rows.len(), 1);
/// assert_eq!(store.released(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ScriptedStore {
    handler: Arc<Handler>,
    state: Arc<ScriptedState>,
    pool_size: usize,
}

impl ScriptedStore {
    /// Pool size reported by [`BackingStore::pool_stats`].
    pub const DEFAULT_POOL_SIZE: usize = 10;

    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<QueryResult> + Send + Sync + 'static,
    {
        ScriptedStore {
            handler: Arc::new(handler),
            state: Arc::new(ScriptedState::default()),
            pool_size: Self::DEFAULT_POOL_SIZE,
        }
    }

    /// A store that returns the same rows for every statement.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        ScriptedStore::new(move |_, _| Ok(QueryResult::rows(rows.clone())))
    }

    /// Make `commit` fail with a query error.
    pub fn fail_commit(&self, fail: bool) {
        self.state.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make `rollback` fail with a query error.
    pub fn fail_rollback(&self, fail: bool) {
        self.state.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Every statement executed so far, in order.
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state
            .executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of executed statements whose SQL starts with `prefix`
    /// (case-insensitive).
    pub fn count_matching(&self, prefix: &str) -> usize {
        let prefix = prefix.to_ascii_lowercase();
        self.executed()
            .iter()
            .filter(|s| s.sql.trim_start().to_ascii_lowercase().starts_with(&prefix))
            .count()
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.state.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl BackingStore for ScriptedStore {
    type Conn = ScriptedConnection;

    async fn acquire(&self) -> Result<ScriptedConnection> {
        if self.is_closed() {
            return Err(Error::query("POOL_CLOSED", "Pool is closed"));
        }
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedConnection {
            handler: Arc::clone(&self.handler),
            state: Arc::clone(&self.state),
            in_transaction: false,
        })
    }

    fn pool_stats(&self) -> PoolStats {
        let outstanding = self.acquired().saturating_sub(self.released());
        PoolStats {
            total: self.pool_size.max(outstanding),
            free: self.pool_size.saturating_sub(outstanding),
            queued: 0,
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        info!("✓ ScriptedStore closed");
        Ok(())
    }
}

/// Connection handed out by [`ScriptedStore`]; counts as released on drop.
pub struct ScriptedConnection {
    handler: Arc<Handler>,
    state: Arc<ScriptedState>,
    in_transaction: bool,
}

impl Connection for ScriptedConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.state
            .executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ExecutedStatement {
                sql: sql.to_string(),
                params: params.to_vec(),
                in_transaction: self.in_transaction,
            });
        (self.handler)(sql, params)
    }

    async fn begin(&mut self) -> Result<()> {
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::query("ER_LOCK_DEADLOCK", "Deadlock found on commit"));
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.in_transaction = false;
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(Error::query(
                "PROTOCOL_CONNECTION_LOST",
                "Connection lost during rollback",
            ));
        }
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}
