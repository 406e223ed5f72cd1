//! Pagination helpers for `read_paginated`.

use crate::error::{Error, Result};
use crate::sql;
use crate::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cached page: total row count, page count and the rows of this page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub total_count: u64,
    pub page_count: u64,
    pub detail: Vec<Row>,
}

/// A zero-based page number normalised from loosely typed input.
///
/// Anything that is not a non-negative integer (negative numbers, NaN,
/// fractional numbers, non-numeric strings, `None`, JSON `null`) becomes page
/// `0`.
///
/// ```
/// use query_cache_kit::page::PageIndex;
///
/// assert_eq!(PageIndex::from(3u64).get(), 3);
/// assert_eq!(PageIndex::from(-1i64).get(), 0);
/// assert_eq!(PageIndex::from("7").get(), 7);
/// assert_eq!(PageIndex::from("next").get(), 0);
/// assert_eq!(PageIndex::from(f64::NAN).get(), 0);
/// assert_eq!(PageIndex::from(None::<u64>).get(), 0);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageIndex(u64);

impl PageIndex {
    pub fn get(self) -> u64 {
        self.0
    }

    fn from_f64(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
            PageIndex(value as u64)
        } else {
            PageIndex(0)
        }
    }
}

impl From<u64> for PageIndex {
    fn from(value: u64) -> Self {
        PageIndex(value)
    }
}

impl From<u32> for PageIndex {
    fn from(value: u32) -> Self {
        PageIndex(u64::from(value))
    }
}

impl From<usize> for PageIndex {
    fn from(value: usize) -> Self {
        PageIndex(value as u64)
    }
}

impl From<i64> for PageIndex {
    fn from(value: i64) -> Self {
        PageIndex(u64::try_from(value).unwrap_or(0))
    }
}

impl From<i32> for PageIndex {
    fn from(value: i32) -> Self {
        PageIndex::from(i64::from(value))
    }
}

impl From<f64> for PageIndex {
    fn from(value: f64) -> Self {
        PageIndex::from_f64(value)
    }
}

impl From<&str> for PageIndex {
    fn from(value: &str) -> Self {
        let trimmed = value.trim();
        if let Ok(n) = trimmed.parse::<u64>() {
            return PageIndex(n);
        }
        trimmed
            .parse::<f64>()
            .map(PageIndex::from_f64)
            .unwrap_or_default()
    }
}

impl From<String> for PageIndex {
    fn from(value: String) -> Self {
        PageIndex::from(value.as_str())
    }
}

impl From<&Value> for PageIndex {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => match (n.as_u64(), n.as_f64()) {
                (Some(u), _) => PageIndex(u),
                (None, Some(f)) => PageIndex::from_f64(f),
                _ => PageIndex(0),
            },
            Value::String(s) => PageIndex::from(s.as_str()),
            _ => PageIndex(0),
        }
    }
}

impl From<Value> for PageIndex {
    fn from(value: Value) -> Self {
        PageIndex::from(&value)
    }
}

impl<T: Into<PageIndex>> From<Option<T>> for PageIndex {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Validate a page size, rejecting zero and negative values.
pub fn validate_page_size(page_size: i64) -> Result<u64> {
    if page_size <= 0 {
        return Err(Error::InvalidArgument(format!(
            "pageSize must be greater than 0, got {}",
            page_size
        )));
    }
    Ok(page_size as u64)
}

/// `ceil(total / page_size)`.
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Counting pass over the un-paginated statement.
pub fn count_statement(statement: &str) -> String {
    format!(
        "SELECT COUNT(*) AS total FROM ({}) AS paginated_count",
        sql::strip_terminator(statement)
    )
}

/// The statement restricted to one page with `LIMIT offset, size`.
pub fn page_statement(statement: &str, page: u64, page_size: u64) -> String {
    format!(
        "{} LIMIT {}, {}",
        sql::strip_terminator(statement),
        page.saturating_mul(page_size),
        page_size
    )
}

/// Read the count produced by [`count_statement`] from its result rows.
///
/// Prefers a `total` column and falls back to the first column; numeric
/// strings (as some drivers return for `COUNT(*)`) are accepted.
pub fn total_from_rows(rows: &[Row]) -> u64 {
    let Some(row) = rows.first() else {
        return 0;
    };
    let value = match row {
        Value::Object(map) => map.get("total").or_else(|| map.values().next()),
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_count_is_ceiling() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(1, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(95, 20), 5);
    }

    #[test]
    fn test_validate_page_size() {
        assert_eq!(validate_page_size(25).unwrap(), 25);
        assert!(matches!(
            validate_page_size(0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_page_size(-5),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_page_index_normalisation() {
        assert_eq!(PageIndex::from(2.0f64).get(), 2);
        assert_eq!(PageIndex::from(2.5f64).get(), 0);
        assert_eq!(PageIndex::from(-3i32).get(), 0);
        assert_eq!(PageIndex::from(" 4 ").get(), 4);
        assert_eq!(PageIndex::from("").get(), 0);
        assert_eq!(PageIndex::from(&json!(null)).get(), 0);
        assert_eq!(PageIndex::from(&json!(5)).get(), 5);
        assert_eq!(PageIndex::from(&json!(-5)).get(), 0);
        assert_eq!(PageIndex::from(&json!("6")).get(), 6);
        assert_eq!(PageIndex::from(&json!([1])).get(), 0);
        assert_eq!(PageIndex::from(Some(9u32)).get(), 9);
    }

    #[test]
    fn test_statements_strip_terminators() {
        assert_eq!(
            count_statement("SELECT * FROM users WHERE active = ?;  "),
            "SELECT COUNT(*) AS total FROM (SELECT * FROM users WHERE active = ?) AS paginated_count"
        );
        assert_eq!(
            page_statement("SELECT * FROM users;\n", 2, 25),
            "SELECT * FROM users LIMIT 50, 25"
        );
    }

    #[test]
    fn test_total_from_rows() {
        assert_eq!(total_from_rows(&[json!({"total": 42})]), 42);
        assert_eq!(total_from_rows(&[json!({"COUNT(*)": "17"})]), 17);
        assert_eq!(total_from_rows(&[json!([8])]), 8);
        assert_eq!(total_from_rows(&[]), 0);
    }
}
