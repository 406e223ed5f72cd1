//! Transactions with deferred cache invalidation.
//!
//! Writes issued through [`Transaction::query`] run on the transaction's
//! dedicated connection and only *buffer* the patterns they would invalidate.
//! The buffer is deduplicated and flushed after a successful commit, and
//! thrown away on rollback, so a rolled-back transaction never touches the
//! cache.
//!
//! [`Transaction::cached_read`] reads through the cache and populates it on a
//! miss with rows read inside the transaction. Those rows may be uncommitted
//! and are visible to other callers immediately; use it only for data the
//! transaction does not modify.
//!
//! The connection is released exactly once: by `commit`, by `rollback`, or
//! when a transaction that was never finished is dropped.

use crate::backend::CacheBackend;
use crate::config::{CacheSettings, ReadOptions};
use crate::error::{Error, Result};
use crate::invalidation::dedup_patterns;
use crate::service::Inner;
use crate::store::{BackingStore, Connection, QueryResult};
use crate::Row;
use serde_json::Value;
use std::sync::Arc;

/// Lifecycle of a [`Transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Open => write!(f, "open"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// An open backing-store transaction.
///
/// Obtained from [`QueryCache::begin`](crate::QueryCache::begin) or passed to
/// the callback of [`QueryCache::transaction`](crate::QueryCache::transaction).
pub struct Transaction<S: BackingStore, B: CacheBackend> {
    inner: Arc<Inner<S, B>>,
    settings: Arc<CacheSettings>,
    conn: Option<S::Conn>,
    pending: Vec<String>,
    state: TransactionState,
}

impl<S: BackingStore, B: CacheBackend> Transaction<S, B> {
    pub(crate) fn new(inner: Arc<Inner<S, B>>, settings: Arc<CacheSettings>, conn: S::Conn) -> Self {
        Transaction {
            inner,
            settings,
            conn: Some(conn),
            pending: Vec::new(),
            state: TransactionState::Open,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Patterns buffered so far, in the order they were planned.
    pub fn pending_patterns(&self) -> &[String] {
        &self.pending
    }

    fn connection(&mut self) -> Result<&mut S::Conn> {
        match (self.state, self.conn.as_mut()) {
            (TransactionState::Open, Some(conn)) => Ok(conn),
            (state, _) => Err(Error::Other(format!("transaction is {}", state))),
        }
    }

    /// Execute a statement and buffer the patterns it invalidates.
    pub async fn query(&mut self, statement: &str, params: &[Value]) -> Result<QueryResult> {
        self.execute_buffered(statement, params, None).await
    }

    /// Execute a statement and buffer `patterns` instead of the planned ones.
    pub async fn query_invalidating(
        &mut self,
        statement: &str,
        params: &[Value],
        patterns: &[String],
    ) -> Result<QueryResult> {
        self.execute_buffered(statement, params, Some(patterns)).await
    }

    async fn execute_buffered(
        &mut self,
        statement: &str,
        params: &[Value],
        manual: Option<&[String]>,
    ) -> Result<QueryResult> {
        self.inner.retry.ensure_running()?;
        let result = self.connection()?.execute(statement, params).await?;
        let planned = self.settings.planner.plan(statement, manual);
        self.pending.extend(planned);
        Ok(result)
    }

    /// Read through the cache, executing inside the transaction on a miss.
    ///
    /// See the module docs for the isolation caveat.
    pub async fn cached_read(
        &mut self,
        statement: &str,
        params: &[Value],
        opts: ReadOptions,
    ) -> Result<Vec<Row>> {
        self.inner.retry.ensure_running()?;
        let inner = Arc::clone(&self.inner);
        let key = inner.read_key(&self.settings, statement, params, &opts);
        let ttl = inner.ttl_for(statement, &opts);
        let conn = self.connection()?;

        inner
            .cached(key, ttl, || async move {
                conn.execute(statement, params).await.map(|result| result.rows)
            })
            .await
    }

    /// Commit, release the connection and flush the invalidation buffer.
    ///
    /// When the commit itself fails the transaction is rolled back (a rollback
    /// failure is only logged), the buffer is discarded and the commit error
    /// returned.
    pub async fn commit(mut self) -> Result<()> {
        self.connection()?;
        let Some(mut conn) = self.conn.take() else {
            return Err(Error::Other("transaction has no connection".to_string()));
        };

        if let Err(e) = conn.commit().await {
            error!("Commit failed, rolling back: {}", e);
            if let Err(rollback_err) = conn.rollback().await {
                error!("Rollback after failed commit also failed: {}", rollback_err);
            }
            conn.release();
            self.state = TransactionState::RolledBack;
            self.pending.clear();
            return Err(e);
        }
        conn.release();
        self.state = TransactionState::Committed;

        let patterns = dedup_patterns(std::mem::take(&mut self.pending));
        debug!("Transaction committed, invalidating {:?}", patterns);
        self.inner.invalidate(&patterns).await;
        Ok(())
    }

    /// Roll back, release the connection and discard the invalidation buffer.
    ///
    /// The connection is released and the buffer discarded even when the
    /// rollback fails.
    pub async fn rollback(mut self) -> Result<()> {
        self.connection()?;
        let Some(mut conn) = self.conn.take() else {
            return Err(Error::Other("transaction has no connection".to_string()));
        };

        let result = conn.rollback().await;
        conn.release();
        self.state = TransactionState::RolledBack;
        debug!(
            "Transaction rolled back, discarded {} pending patterns",
            self.pending.len()
        );
        self.pending.clear();
        result
    }
}

impl<S: BackingStore, B: CacheBackend> Drop for Transaction<S, B> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(
                "Transaction dropped while {}; releasing connection without commit, discarding {} pending patterns",
                self.state,
                self.pending.len()
            );
            conn.release();
        }
    }
}
