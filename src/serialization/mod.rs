//! JSON encoding for cached query results.
//!
//! Cached values are stored as plain JSON text so that any service sharing the
//! cache store can read them. Two shapes are written:
//!
//! ```text
//! plain read      [ {row}, {row}, ... ]
//! paginated read  { "totalCount": N, "pageCount": M, "detail": [ {row}, ... ] }
//! ```
//!
//! Decoding is shape-checked: asking for rows when a page object is stored (or
//! the reverse) is a `Deserialization` error, which the read paths treat as a
//! cache miss.
//!
//! ```rust
//! use query_cache_kit::serialization::{deserialize_from_cache, serialize_for_cache};
//! use query_cache_kit::Row;
//! use serde_json::json;
//!
//! # fn main() -> query_cache_kit::Result<()> {
//! let rows: Vec<Row> = vec![json!({"id": 1, "name": "Alice"})];
//! let bytes = serialize_for_cache(&rows)?;
//! let decoded: Vec<Row> = deserialize_from_cache(&bytes)?;
//! assert_eq!(rows, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Encode a value for the cache store.
///
/// # Errors
/// Returns `Error::Serialization` if the value cannot be represented as JSON.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a cached value.
///
/// # Errors
/// Returns `Error::Deserialization` on malformed JSON or a shape mismatch.
pub fn deserialize_from_cache<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageResult;
    use crate::Row;
    use serde_json::json;

    #[test]
    fn test_rows_are_plain_json_arrays() {
        let rows: Vec<Row> = vec![json!({"id": 1})];
        let bytes = serialize_for_cache(&rows).expect("serialize");
        assert_eq!(bytes, br#"[{"id":1}]"#.to_vec());
    }

    #[test]
    fn test_page_and_rows_are_distinguishable() {
        let page = PageResult {
            total_count: 3,
            page_count: 2,
            detail: vec![json!({"id": 1}), json!({"id": 2})],
        };
        let page_bytes = serialize_for_cache(&page).expect("serialize");
        assert!(matches!(
            deserialize_from_cache::<Vec<Row>>(&page_bytes),
            Err(Error::Deserialization(_))
        ));

        let row_bytes = serialize_for_cache(&vec![json!({"id": 1})]).expect("serialize");
        assert!(matches!(
            deserialize_from_cache::<PageResult>(&row_bytes),
            Err(Error::Deserialization(_))
        ));

        let decoded: PageResult = deserialize_from_cache(&page_bytes).expect("deserialize");
        assert_eq!(decoded, page);
    }

    #[test]
    fn test_garbage_is_deserialization_error() {
        assert!(matches!(
            deserialize_from_cache::<Vec<Row>>(b"\x00\x01not json"),
            Err(Error::Deserialization(_))
        ));
    }
}
