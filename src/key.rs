//! Cache key derivation.
//!
//! Keys are derived from the statement text and the parameter list so callers
//! never have to invent one:
//!
//! ```
//! use query_cache_kit::key::{KeyGenerator, KeyOptions};
//! use serde_json::json;
//!
//! let key = KeyGenerator::generate(
//!     "SELECT * FROM orders WHERE user_id = ? AND status = ?",
//!     &[json!(123), json!("active")],
//!     &KeyOptions::default(),
//! );
//! assert!(key.starts_with("orders:status:user_id:"));
//! ```
//!
//! Derivation never fails. Statements the heuristics in [`crate::sql`] cannot
//! read fall back to `query:{hash(statement)}`.

use crate::sql;
use crate::strategy::KeyStrategy;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Width of the hex hashes embedded in keys.
pub const HASH_LEN: usize = 8;

/// Per-call options for key derivation.
#[derive(Clone, Debug, Default)]
pub struct KeyOptions {
    /// Overrides the parameter-count heuristic when not `Auto`.
    pub strategy: KeyStrategy,
}

impl KeyOptions {
    pub fn with_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Derives cache keys from `(statement, parameters)` pairs.
pub struct KeyGenerator;

impl KeyGenerator {
    /// Derive a cache key for a statement and its parameters.
    ///
    /// - no table recognised: `query:{hash(statement)}`
    /// - no `WHERE` clause: `{table}:all`
    /// - `WHERE` without readable columns: `{table}:{paramHash}`
    /// - detailed: `{table}:{sorted columns}:{paramHash}`
    /// - simple: `{table}:{paramHash}`
    pub fn generate(statement: &str, params: &[Value], options: &KeyOptions) -> String {
        let Some(table) = sql::extract_table(statement) else {
            return format!("query:{}", short_hash(statement.as_bytes()));
        };

        let Some(columns) = sql::where_columns(statement) else {
            return format!("{}:all", table);
        };

        let param_hash = Self::param_hash(params);
        if columns.is_empty() {
            return format!("{}:{}", table, param_hash);
        }

        match options.strategy.resolve(params.len()) {
            KeyStrategy::Detailed => format!("{}:{}:{}", table, columns.join(":"), param_hash),
            _ => format!("{}:{}", table, param_hash),
        }
    }

    /// Hash of the stable JSON form of `params`, or `all` when empty.
    pub fn param_hash(params: &[Value]) -> String {
        if params.is_empty() {
            return "all".to_string();
        }
        let mut json = String::new();
        write_stable_json(&Value::Array(params.to_vec()), &mut json);
        short_hash(json.as_bytes())
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts.join(":")
    }
}

/// Apply the configured namespace: `key ↦ {namespace}:{key}`.
pub fn namespaced(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{}:{}", ns, key),
        _ => key.to_string(),
    }
}

/// First [`HASH_LEN`] hex chars of the SHA-256 digest.
pub fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

/// JSON encoding with object keys sorted, independent of map ordering features.
fn write_stable_json(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable_json(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_stable_json(v, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
