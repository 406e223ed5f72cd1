//! Observability hooks and TTL policies.
//!
//! - **Metrics (`CacheMetrics`)**: hits, misses, cache writes, invalidations
//!   and swallowed cache-store failures.
//! - **TTL Policies (`TtlPolicy`)**: how long cached query results live.
//!
//! ```
//! use query_cache_kit::observability::TtlPolicy;
//! use std::time::Duration;
//!
//! let _policy = TtlPolicy::PerTable(|table| match table {
//!     "sessions" => Duration::from_secs(60),
//!     _ => Duration::from_secs(3600),
//! });
//! ```
//!
//! The default metrics sink is [`NoOpMetrics`]; the default TTL is
//! [`DEFAULT_TTL`].

use std::time::Duration;

/// TTL applied when neither the call nor the policy says otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(40_000);

/// Trait for cache metrics collection.
///
/// Every method has a logging default, so implementors only override what
/// they export.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss (includes the backing-store round trip).
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a cache population. `ttl` is `None` for entries without expiry.
    fn record_set(&self, key: &str, ttl: Option<Duration>) {
        match ttl {
            Some(ttl) => debug!("Cache SET: {} (TTL {:?})", key, ttl),
            None => debug!("Cache SET: {} (no expiry)", key),
        }
    }

    /// Record an invalidation pass.
    fn record_invalidation(&self, patterns: &[String]) {
        debug!("Cache INVALIDATE: {:?}", patterns);
    }

    /// Record a cache-store failure that was converted to a fallback.
    fn record_error(&self, operation: &str, error: &str) {
        warn!("Cache ERROR during {}: {}", operation, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _ttl: Option<Duration>) {}
    fn record_invalidation(&self, _patterns: &[String]) {}
    fn record_error(&self, _operation: &str, _error: &str) {}
}

/// TTL (Time-to-Live) policy for cached query results.
#[derive(Clone, Debug)]
pub enum TtlPolicy {
    /// Fixed duration for all entries
    Fixed(Duration),

    /// No TTL (entries live until invalidated or evicted)
    Infinite,

    /// Custom per-table policy, keyed by the statement's table name
    PerTable(fn(&str) -> Duration),
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::Fixed(DEFAULT_TTL)
    }
}

impl TtlPolicy {
    /// TTL for results read from `table` (`None` when the table is unknown).
    pub fn get_ttl(&self, table: Option<&str>) -> Option<Duration> {
        match self {
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::Infinite => None,
            TtlPolicy::PerTable(f) => Some(table.map(f).unwrap_or(DEFAULT_TTL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key", Duration::from_secs(1));
        metrics.record_miss("key", Duration::from_secs(2));
        metrics.record_invalidation(&["users:*".to_string()]);
    }

    #[test]
    fn test_ttl_policy_default() {
        assert_eq!(TtlPolicy::default().get_ttl(Some("any")), Some(DEFAULT_TTL));
        assert_eq!(DEFAULT_TTL.as_secs(), 40_000);
    }

    #[test]
    fn test_ttl_policy_infinite() {
        assert_eq!(TtlPolicy::Infinite.get_ttl(Some("any")), None);
    }

    #[test]
    fn test_ttl_policy_per_table() {
        let policy = TtlPolicy::PerTable(|table| match table {
            "sessions" => Duration::from_secs(60),
            _ => Duration::from_secs(1800),
        });

        assert_eq!(
            policy.get_ttl(Some("sessions")),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            policy.get_ttl(Some("other")),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(policy.get_ttl(None), Some(DEFAULT_TTL));
    }
}
