//! Cache store resilience.
//!
//! The cache store is an optimisation, never a dependency the application may
//! fail on. [`ResilientCache`] wraps a [`CacheBackend`] with:
//!
//! - a connection state machine (`Disconnected → Connecting → Ready`) published
//!   on a `tokio::sync::watch` channel, so waiters park instead of polling;
//! - a supervisor task that reconnects forever with capped exponential
//!   backoff plus jitter;
//! - [`ResilientCache::safe_execute`], which waits a bounded time for `Ready`,
//!   runs the operation, and turns any failure into a caller-supplied fallback.
//!
//! ```text
//!            connect() ok                 operation failed
//! Connecting ───────────────▶ Ready ─────────────────────────┐
//!     ▲                                                       │
//!     │ backoff elapsed                                       ▼
//!     └──────────────────────────────────────────────── Disconnected
//! ```

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::key::namespaced;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use crate::Row;
use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Keys deleted per command by [`ResilientCache::delete_by_prefix`].
pub const DELETE_BATCH_SIZE: usize = 100;

/// Scan batch hint passed to [`CacheBackend::scan`].
pub const SCAN_COUNT: usize = 100;

/// Connection readiness of the cache store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
        }
    }
}

/// Single owner of the connection state.
#[derive(Debug)]
pub struct ConnectionMonitor {
    state: watch::Sender<ConnectionState>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        ConnectionMonitor { state }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move to `next`, waking waiters when the state actually changes.
    pub fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!("Cache store connection {} -> {}", current, next);
            *current = next;
            true
        });
    }

    /// Wait up to `timeout` for `Ready`. Returns whether it was reached.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Ready)).await,
            Ok(Ok(_))
        );
        ready
    }

    /// Park until the state leaves `Ready`.
    async fn wait_lost(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s != ConnectionState::Ready).await;
    }
}

/// Reconnect backoff: `min(base * 2^(attempt-1), max_delay) + jitter`.
///
/// Attempts are unbounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniformly random delay added to every wait.
    pub max_jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the one-based reconnect `attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Delay before the one-based reconnect `attempt`, with jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }
}

/// Settings for [`ResilientCache`].
#[derive(Clone, Debug)]
pub struct ResilienceConfig {
    /// How long an operation waits for `Ready` before using its fallback.
    pub wait_timeout: Duration,
    /// Upper bound for a single cache command (and for `connect`).
    pub command_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Prefix applied as `{namespace}:{key}` to keys and patterns.
    pub namespace: Option<String>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        ResilienceConfig {
            wait_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            namespace: None,
        }
    }
}

impl ResilienceConfig {
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Cache store client that never fails its callers.
///
/// Must be created inside a Tokio runtime: construction spawns the reconnect
/// supervisor, which is aborted when the cache is dropped or closed.
pub struct ResilientCache<B: CacheBackend> {
    backend: B,
    monitor: Arc<ConnectionMonitor>,
    config: ResilienceConfig,
    metrics: Arc<dyn CacheMetrics>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<B: CacheBackend> ResilientCache<B> {
    pub fn new(backend: B, config: ResilienceConfig) -> Self {
        let monitor = Arc::new(ConnectionMonitor::new());
        let handle = tokio::spawn(supervise(
            backend.clone(),
            Arc::clone(&monitor),
            config.reconnect.clone(),
            config.command_timeout,
        ));

        ResilientCache {
            backend,
            monitor,
            config,
            metrics: Arc::new(NoOpMetrics),
            supervisor: Mutex::new(Some(handle)),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Whether the cache store is `Ready`; suitable for liveness endpoints.
    pub fn is_healthy(&self) -> bool {
        self.monitor.state() == ConnectionState::Ready
    }

    /// Wait up to `timeout` for the connection to become `Ready`.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.monitor.wait_ready(timeout).await
    }

    /// Full cache key for `key` under the configured namespace.
    pub fn full_key(&self, key: &str) -> String {
        namespaced(self.config.namespace.as_deref(), key)
    }

    /// Run `op` against a ready store, or return `fallback`.
    ///
    /// Waits at most `wait_timeout` for readiness and `command_timeout` for
    /// the operation. Failures are logged and reported to metrics; cache-store
    /// failures and timeouts also mark the connection lost so the supervisor
    /// reconnects.
    pub async fn safe_execute<T, F, Fut>(&self, operation: &str, fallback: T, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.monitor.wait_ready(self.config.wait_timeout).await {
            warn!(
                "Cache store not ready after {:?}, skipping {}",
                self.config.wait_timeout, operation
            );
            self.metrics.record_error(operation, "cache store not ready");
            return fallback;
        }

        let error = match tokio::time::timeout(self.config.command_timeout, op()).await {
            Ok(Ok(value)) => return value,
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout(format!(
                "cache {} exceeded {:?}",
                operation, self.config.command_timeout
            )),
        };

        warn!("Cache {} failed, using fallback: {}", operation, error);
        self.metrics.record_error(operation, &error.to_string());
        if matches!(error, Error::CacheStore(_) | Error::Timeout(_)) {
            self.monitor.transition(ConnectionState::Disconnected);
        }
        fallback
    }

    /// Cached rows for `key`; `[]` on miss or failure.
    pub async fn get(&self, key: &str) -> Vec<Row> {
        self.lookup::<Vec<Row>>(key).await.unwrap_or_default()
    }

    /// Typed lookup; `None` on miss, failure or shape mismatch.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.full_key(key);
        self.safe_execute("get", None, || async {
            match self.backend.get(&full_key).await? {
                Some(bytes) => deserialize_from_cache(&bytes).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    /// Whether `key` is cached; `false` on failure.
    pub async fn exists(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        self.safe_execute("exists", false, || self.backend.exists(&full_key))
            .await
    }

    /// Cache `value` under `key` and hand it back, whether or not caching worked.
    pub async fn set<T: Serialize>(&self, key: &str, value: T, ttl: Option<Duration>) -> T {
        let bytes = match serialize_for_cache(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cache set skipped for {}: {}", key, e);
                return value;
            }
        };
        let full_key = self.full_key(key);
        let stored = self
            .safe_execute("set", false, || async {
                self.backend.set(&full_key, bytes, ttl).await.map(|_| true)
            })
            .await;
        if stored {
            self.metrics.record_set(&full_key, ttl);
        }
        value
    }

    /// Delete keys. Fire-and-forget.
    pub async fn delete<K: AsRef<str>>(&self, keys: &[K]) {
        if keys.is_empty() {
            return;
        }
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(k.as_ref())).collect();
        self.safe_execute("delete", (), || async {
            let refs: Vec<&str> = full_keys.iter().map(String::as_str).collect();
            self.backend.mdelete(&refs).await
        })
        .await
    }

    /// Delete every key matching each glob pattern. Returns the keys deleted.
    ///
    /// Keys are discovered with the backend's cursor scan and deleted in
    /// batches of [`DELETE_BATCH_SIZE`]. A failure stops the pass and returns
    /// what was deleted so far (0 when the store is down).
    pub async fn delete_by_prefix<P: AsRef<str>>(&self, patterns: &[P]) -> usize {
        if patterns.is_empty() {
            return 0;
        }
        let full_patterns: Vec<String> = patterns
            .iter()
            .map(|p| self.full_key(p.as_ref()))
            .collect();

        let mut deleted = 0;
        for pattern in &full_patterns {
            deleted += self
                .safe_execute("delete_by_prefix", 0, || self.scan_and_delete(pattern))
                .await;
        }
        if deleted > 0 {
            debug!("Invalidated {} keys for {:?}", deleted, full_patterns);
        }
        deleted
    }

    async fn scan_and_delete(&self, pattern: &str) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut cursor = 0;
        loop {
            let (next, keys) = self.backend.scan(cursor, pattern, SCAN_COUNT).await?;
            seen.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let keys: Vec<String> = seen.into_iter().collect();
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            self.backend.mdelete(&refs).await?;
        }
        Ok(keys.len())
    }

    /// Stop reconnecting and mark the connection down.
    pub fn close(&self) {
        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.monitor.transition(ConnectionState::Disconnected);
        info!("Cache store connection closed");
    }
}

impl<B: CacheBackend> Drop for ResilientCache<B> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .supervisor
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// Connect, park while `Ready`, and reconnect forever after a loss.
async fn supervise<B: CacheBackend>(
    backend: B,
    monitor: Arc<ConnectionMonitor>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
) {
    let mut attempt: u32 = 0;
    loop {
        monitor.transition(ConnectionState::Connecting);

        let outcome = match tokio::time::timeout(connect_timeout, backend.connect()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "cache connect exceeded {:?}",
                connect_timeout
            ))),
        };

        match outcome {
            Ok(()) => {
                if attempt > 0 {
                    info!("✓ Cache store reconnected after {} attempts", attempt);
                } else {
                    info!("✓ Cache store ready");
                }
                attempt = 0;
                monitor.transition(ConnectionState::Ready);
                monitor.wait_lost().await;
                warn!("⚠ Cache store connection lost, reconnecting");
            }
            Err(e) => {
                attempt = attempt.saturating_add(1);
                monitor.transition(ConnectionState::Disconnected);
                let delay = policy.delay(attempt);
                warn!(
                    "Cache store connect attempt {} failed: {} (retrying in {:?})",
                    attempt, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
