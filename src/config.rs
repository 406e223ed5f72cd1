//! Configuration for [`QueryCache`](crate::QueryCache) and its per-call options.
//!
//! # Setup-time vs per-call configuration
//!
//! - **Setup-time**: [`QueryCacheConfig`] is handed to the builder once.
//!   The key and invalidation part of it lives in an immutable
//!   [`CacheSettings`] snapshot that [`QueryCache::configure`] replaces
//!   wholesale at runtime.
//! - **Per-call**: [`ReadOptions`], [`WriteOptions`] and [`BulkInsertOptions`]
//!   override keys, TTLs, timeouts, patterns and the target store for one call.
//!
//! ```
//! use query_cache_kit::config::{QueryCacheConfig, ReadOptions};
//! use query_cache_kit::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let config = QueryCacheConfig::default()
//!     .with_namespace("shop")
//!     .with_retry(RetryPolicy::default().with_retries(5))
//!     .with_rule("orders", ["orders:*", "reports:*"]);
//!
//! let opts = ReadOptions::default()
//!     .with_key("orders:recent")
//!     .with_ttl(Duration::from_secs(60));
//! # let _ = (config, opts);
//! ```
//!
//! [`QueryCache::configure`]: crate::QueryCache::configure

use crate::invalidation::{InvalidationPlanner, InvalidationRules};
use crate::observability::TtlPolicy;
use crate::resilience::ResilienceConfig;
use crate::retry::RetryPolicy;
use crate::strategy::KeyStrategy;
use std::time::Duration;

/// Default number of records per `INSERT` in `bulk_insert`.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Construction-time configuration of a `QueryCache`.
#[derive(Clone, Debug)]
pub struct QueryCacheConfig {
    /// Master switch; when off every read goes straight to the backing store.
    pub cache_enabled: bool,
    /// Derive keys for reads that do not supply one.
    pub auto_key_enabled: bool,
    /// Plan invalidation patterns for writes without manual patterns.
    pub auto_invalidation_enabled: bool,
    pub invalidation_rules: InvalidationRules,
    /// Strategy used when a read does not pick one.
    pub key_strategy: KeyStrategy,
    pub ttl_policy: TtlPolicy,
    pub retry: RetryPolicy,
    pub resilience: ResilienceConfig,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        QueryCacheConfig {
            cache_enabled: true,
            auto_key_enabled: true,
            auto_invalidation_enabled: true,
            invalidation_rules: InvalidationRules::new(),
            key_strategy: KeyStrategy::Auto,
            ttl_policy: TtlPolicy::default(),
            retry: RetryPolicy::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl QueryCacheConfig {
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_auto_key(mut self, enabled: bool) -> Self {
        self.auto_key_enabled = enabled;
        self
    }

    pub fn with_auto_invalidation(mut self, enabled: bool) -> Self {
        self.auto_invalidation_enabled = enabled;
        self
    }

    /// Replace the patterns invalidated after writes to `table`.
    pub fn with_rule<I, P>(mut self, table: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.invalidation_rules
            .insert(table.into(), patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_invalidation_rules(mut self, rules: InvalidationRules) -> Self {
        self.invalidation_rules = rules;
        self
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self
    }

    /// Prefix every cache key as `{namespace}:{key}`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.resilience.namespace = Some(namespace.into());
        self
    }

    pub(crate) fn settings(&self) -> CacheSettings {
        CacheSettings {
            auto_key_enabled: self.auto_key_enabled,
            key_strategy: self.key_strategy,
            planner: InvalidationPlanner::new(
                self.auto_invalidation_enabled,
                self.invalidation_rules.clone(),
            ),
        }
    }
}

/// Immutable key and invalidation settings shared by in-flight calls.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub auto_key_enabled: bool,
    pub key_strategy: KeyStrategy,
    pub planner: InvalidationPlanner,
}

impl CacheSettings {
    /// A new snapshot with the supplied fields of `options` replaced.
    pub fn reconfigured(&self, options: ConfigureOptions) -> CacheSettings {
        let enabled = options
            .auto_invalidation_enabled
            .unwrap_or_else(|| self.planner.is_enabled());
        let rules = options
            .invalidation_rules
            .unwrap_or_else(|| self.planner.rules().clone());

        CacheSettings {
            auto_key_enabled: options.auto_key_enabled.unwrap_or(self.auto_key_enabled),
            key_strategy: self.key_strategy,
            planner: InvalidationPlanner::new(enabled, rules),
        }
    }
}

/// Runtime reconfiguration; `None` fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct ConfigureOptions {
    pub auto_key_enabled: Option<bool>,
    pub auto_invalidation_enabled: Option<bool>,
    pub invalidation_rules: Option<InvalidationRules>,
}

impl ConfigureOptions {
    pub fn with_auto_key(mut self, enabled: bool) -> Self {
        self.auto_key_enabled = Some(enabled);
        self
    }

    pub fn with_auto_invalidation(mut self, enabled: bool) -> Self {
        self.auto_invalidation_enabled = Some(enabled);
        self
    }

    pub fn with_invalidation_rules(mut self, rules: InvalidationRules) -> Self {
        self.invalidation_rules = Some(rules);
        self
    }
}

/// Per-call options for reads.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Cache key used verbatim instead of a derived one.
    pub key: Option<String>,
    /// TTL for this entry only; takes precedence over the TTL policy.
    pub ttl: Option<Duration>,
    /// Key strategy for this read only.
    pub strategy: Option<KeyStrategy>,
    /// Named backing store; the default store when `None`.
    pub target: Option<String>,
    /// Per-attempt timeout for this read only.
    pub timeout: Option<Duration>,
}

impl ReadOptions {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Per-call options for writes.
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// Patterns to invalidate instead of the planned ones.
    pub patterns: Option<Vec<String>>,
    pub target: Option<String>,
    pub timeout: Option<Duration>,
}

impl WriteOptions {
    pub fn with_patterns<I, P>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for `bulk_insert`.
#[derive(Clone, Debug)]
pub struct BulkInsertOptions {
    /// Records per `INSERT` statement (values below 1 are treated as 1).
    pub chunk_size: usize,
    /// Pattern invalidated once at the end instead of the table defaults.
    pub reset_pattern: Option<String>,
    pub target: Option<String>,
}

impl Default for BulkInsertOptions {
    fn default() -> Self {
        BulkInsertOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            reset_pattern: None,
            target: None,
        }
    }
}

impl BulkInsertOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_reset_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.reset_pattern = Some(pattern.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Outcome of `bulk_insert`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkInsertResult {
    /// Sum of the affected rows reported for every chunk.
    pub inserted_rows: u64,
    /// Number of `INSERT` statements executed.
    pub chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryCacheConfig::default();
        assert!(config.cache_enabled);
        assert!(config.auto_key_enabled);
        assert!(config.auto_invalidation_enabled);
        assert!(config.invalidation_rules.is_empty());
        assert_eq!(config.retry.retries, 3);
        assert_eq!(BulkInsertOptions::default().chunk_size, 1000);
    }

    #[test]
    fn test_with_rule_and_namespace() {
        let config = QueryCacheConfig::default()
            .with_rule("orders", ["orders:*", "reports:*"])
            .with_namespace("shop");

        assert_eq!(
            config.invalidation_rules.get("orders"),
            Some(&vec!["orders:*".to_string(), "reports:*".to_string()])
        );
        assert_eq!(config.resilience.namespace.as_deref(), Some("shop"));
    }

    #[test]
    fn test_reconfigure_keeps_unset_fields() {
        let settings = QueryCacheConfig::default()
            .with_rule("users", ["people:*"])
            .settings();

        let next = settings.reconfigured(ConfigureOptions::default().with_auto_key(false));
        assert!(!next.auto_key_enabled);
        assert!(next.planner.is_enabled());
        assert_eq!(next.planner.rules().len(), 1);

        let next = next.reconfigured(
            ConfigureOptions::default()
                .with_auto_invalidation(false)
                .with_invalidation_rules(InvalidationRules::new()),
        );
        assert!(!next.auto_key_enabled);
        assert!(!next.planner.is_enabled());
        assert!(next.planner.rules().is_empty());
        // the previous snapshot is untouched
        assert!(settings.auto_key_enabled);
    }
}
