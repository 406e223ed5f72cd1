//! Invalidation planning for write statements.
//!
//! After a write, every cached read that may have observed the affected table
//! has to go. The planner turns a statement into a list of key patterns that
//! the resilience layer deletes with a cursor scan.
//!
//! ```
//! use query_cache_kit::invalidation::InvalidationPlanner;
//!
//! let planner = InvalidationPlanner::default();
//! assert_eq!(
//!     planner.plan("INSERT INTO users (name) VALUES (?)", None),
//!     vec!["users_*".to_string(), "users:*".to_string()]
//! );
//! assert!(planner.plan("SELECT * FROM users", None).is_empty());
//! ```

use crate::sql;
use std::collections::{HashMap, HashSet};

/// Table name → patterns to delete after a write to that table.
pub type InvalidationRules = HashMap<String, Vec<String>>;

/// Computes invalidation patterns from write statements.
///
/// Holds an immutable snapshot of the rule table; reconfiguring builds a new
/// planner instead of mutating this one.
#[derive(Clone, Debug)]
pub struct InvalidationPlanner {
    enabled: bool,
    rules: InvalidationRules,
}

impl Default for InvalidationPlanner {
    fn default() -> Self {
        InvalidationPlanner::new(true, InvalidationRules::new())
    }
}

impl InvalidationPlanner {
    pub fn new(enabled: bool, rules: InvalidationRules) -> Self {
        InvalidationPlanner { enabled, rules }
    }

    /// Whether automatic invalidation is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured rules.
    pub fn rules(&self) -> &InvalidationRules {
        &self.rules
    }

    /// Patterns to invalidate after `statement` runs.
    ///
    /// Manual patterns are returned verbatim even when automatic invalidation
    /// is disabled. Otherwise only `INSERT`/`UPDATE`/`DELETE`/`REPLACE`
    /// statements with a recognisable table produce patterns.
    pub fn plan(&self, statement: &str, manual: Option<&[String]>) -> Vec<String> {
        if let Some(patterns) = manual {
            return patterns.to_vec();
        }

        if !self.enabled || !sql::is_write_statement(statement) {
            return Vec::new();
        }

        let Some(table) = sql::extract_write_table(statement) else {
            debug!("No table found for write statement, nothing to invalidate");
            return Vec::new();
        };

        match self.rules.get(&table) {
            Some(patterns) => patterns.clone(),
            None => default_patterns(&table),
        }
    }
}

/// Patterns used for tables without an explicit rule.
pub fn default_patterns(table: &str) -> Vec<String> {
    vec![format!("{}_*", table), format!("{}:*", table)]
}

/// Drop repeated patterns, keeping the first occurrence order.
pub fn dedup_patterns(patterns: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(patterns.len());
    patterns
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
