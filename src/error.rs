//! Error types for the query cache layer.

use std::fmt;

/// Result type for query cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes treated as transient connectivity failures by the retry executor.
///
/// Anything outside this list (syntax errors, constraint violations, ...) is
/// surfaced to the caller on the first attempt.
pub const TRANSIENT_ERROR_CODES: &[&str] = &[
    "ECONNREFUSED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "PROTOCOL_CONNECTION_LOST",
    "ER_CON_COUNT_ERROR",
];

/// Error types for the query cache layer.
///
/// Only backing-store, argument and lifecycle errors ever reach callers of
/// `read`/`write`. Cache store failures are converted to fallback values at
/// the resilience boundary and show up in logs instead.
#[derive(Debug, Clone)]
pub enum Error {
    /// The backing store rejected or failed a statement.
    ///
    /// `code` carries the driver error code when one is known
    /// (e.g. `ECONNREFUSED`, `ER_DUP_ENTRY`). Codes listed in
    /// [`TRANSIENT_ERROR_CODES`] are retried, everything else is not.
    Query {
        /// Driver error code, if any.
        code: Option<String>,
        /// Human readable message from the driver.
        message: String,
    },

    /// Cache store error (Redis, in-memory backend marked unavailable, ...).
    ///
    /// Returned by [`CacheBackend`](crate::backend::CacheBackend)
    /// implementations. The resilience layer swallows it and logs a warning.
    CacheStore(String),

    /// An explicit timeout option was exceeded.
    ///
    /// The abandoned attempt is dropped; it is never retried.
    Timeout(String),

    /// Missing or invalid configuration detected at startup.
    Config(String),

    /// A call was issued after graceful shutdown started.
    ShuttingDown,

    /// Caller supplied an invalid argument (e.g. a page size of zero).
    InvalidArgument(String),

    /// A value could not be encoded for the cache store.
    Serialization(String),

    /// A cached payload could not be decoded into the requested shape.
    ///
    /// Treated as a cache miss by the read paths.
    Deserialization(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Build a backing-store error carrying a driver code.
    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Query {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Build a backing-store error without a driver code.
    pub fn query_message(message: impl Into<String>) -> Self {
        Error::Query {
            code: None,
            message: message.into(),
        }
    }

    /// Driver error code, when this is a backing-store error that has one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether this error is a transient connectivity failure worth retrying.
    pub fn is_transient(&self) -> bool {
        self.code()
            .is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code))
    }

    /// Whether this error came from an exceeded timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query {
                code: Some(code),
                message,
            } => write!(f, "Query error [{}]: {}", code, message),
            Error::Query {
                code: None,
                message,
            } => write!(f, "Query error: {}", message),
            Error::CacheStore(msg) => write!(f, "Cache store error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
            Error::ShuttingDown => write!(f, "Query cache is shutting down"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Deserialization(msg) => write!(f, "Deserialization error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::CacheStore(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Serialization(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::CacheStore(format!("Redis error: {}", e))
    }
}
