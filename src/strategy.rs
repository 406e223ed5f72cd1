//! Key derivation strategies.
//!
//! When a caller does not supply a cache key, one is derived from the statement
//! and its parameters. The strategy decides how much of the statement's shape
//! ends up in the key.
//!
//! | Strategy | Key shape | Use case |
//! |----------|-----------|----------|
//! | **Auto** | detailed for ≤3 params, simple otherwise | Default |
//! | **Simple** | `{table}:{paramHash}` | Wide filters, short keys |
//! | **Detailed** | `{table}:{col}:{col}:{paramHash}` | Readable keys for debugging |
//!
//! ```
//! use query_cache_kit::strategy::KeyStrategy;
//!
//! let strategy: KeyStrategy = "detailed".parse().unwrap();
//! assert_eq!(strategy, KeyStrategy::Detailed);
//! assert_eq!(KeyStrategy::default(), KeyStrategy::Auto);
//! ```

use crate::error::Error;
use std::str::FromStr;

/// Parameter count above which `Auto` switches to the simple form.
pub const DETAILED_KEY_MAX_PARAMS: usize = 3;

/// Strategy enum controlling the shape of derived cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Pick detailed keys for small parameter lists, simple keys otherwise.
    #[default]
    Auto,

    /// Table name plus parameter hash.
    Simple,

    /// Table name, sorted `WHERE` columns and parameter hash.
    Detailed,
}

impl KeyStrategy {
    /// Resolve `Auto` against a parameter count.
    pub fn resolve(self, param_count: usize) -> KeyStrategy {
        match self {
            KeyStrategy::Auto if param_count <= DETAILED_KEY_MAX_PARAMS => KeyStrategy::Detailed,
            KeyStrategy::Auto => KeyStrategy::Simple,
            other => other,
        }
    }
}

impl std::fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyStrategy::Auto => write!(f, "auto"),
            KeyStrategy::Simple => write!(f, "simple"),
            KeyStrategy::Detailed => write!(f, "detailed"),
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(KeyStrategy::Auto),
            "simple" => Ok(KeyStrategy::Simple),
            "detailed" => Ok(KeyStrategy::Detailed),
            other => Err(Error::InvalidArgument(format!(
                "unknown key strategy: {}",
                other
            ))),
        }
    }
}
