//! Lightweight statement inspection.
//!
//! These helpers are regex heuristics, not a SQL parser. They recognise the
//! handful of shapes the key generator and invalidation planner care about
//! (the target table, the `WHERE` clause and its column names, whether a
//! statement writes) and return `None`/empty for anything else so callers can
//! fall back to hash-based behaviour.

use regex::Regex;
use std::sync::OnceLock;

/// Table extraction for read and write statements.
fn table_regex() -> &'static Regex {
    static TABLE_REGEX: OnceLock<Regex> = OnceLock::new();
    TABLE_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(?:FROM|INSERT\s+INTO|UPDATE|DELETE\s+FROM)\s+(?:[`"\[]?[\w$]+[`"\]]?\.)?[`"\[]?([\w$]+)[`"\]]?"#,
        )
        .expect("Invalid regex")
    })
}

/// Same as [`table_regex`] but also accepts `REPLACE INTO`.
fn write_table_regex() -> &'static Regex {
    static WRITE_TABLE_REGEX: OnceLock<Regex> = OnceLock::new();
    WRITE_TABLE_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(?:FROM|INSERT\s+INTO|REPLACE\s+INTO|UPDATE|DELETE\s+FROM)\s+(?:[`"\[]?[\w$]+[`"\]]?\.)?[`"\[]?([\w$]+)[`"\]]?"#,
        )
        .expect("Invalid regex")
    })
}

fn write_statement_regex() -> &'static Regex {
    static WRITE_REGEX: OnceLock<Regex> = OnceLock::new();
    WRITE_REGEX
        .get_or_init(|| Regex::new(r"(?i)^\s*(INSERT|UPDATE|DELETE|REPLACE)\b").expect("Invalid regex"))
}

fn where_regex() -> &'static Regex {
    static WHERE_REGEX: OnceLock<Regex> = OnceLock::new();
    WHERE_REGEX.get_or_init(|| Regex::new(r"(?i)\bWHERE\b").expect("Invalid regex"))
}

/// Clauses that terminate a `WHERE` clause.
fn where_end_regex() -> &'static Regex {
    static WHERE_END_REGEX: OnceLock<Regex> = OnceLock::new();
    WHERE_END_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(?:ORDER\s+BY|LIMIT|GROUP\s+BY|HAVING)\b").expect("Invalid regex")
    })
}

/// Left-hand identifier of a condition, optionally qualified and quoted.
///
/// Longer operators come first in the alternation so `>=` wins over `>`.
fn condition_column_regex() -> &'static Regex {
    static CONDITION_REGEX: OnceLock<Regex> = OnceLock::new();
    CONDITION_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)^[\s(]*(?:[`"\[]?[\w$]+[`"\]]?\.)?[`"\[]?([A-Za-z_$][\w$]*)[`"\]]?\s*(?:>=|<=|!=|<>|=|>|<|NOT\s+IN\b|NOT\s+LIKE\b|IN\b|LIKE\b)"#,
        )
        .expect("Invalid regex")
    })
}

/// Extract the target table of a read or write statement.
///
/// Looks at the first `FROM`, `INSERT INTO`, `UPDATE` or `DELETE FROM` clause.
/// A `schema.` qualifier is dropped; quoting with backticks, double quotes or
/// brackets is tolerated.
pub fn extract_table(statement: &str) -> Option<String> {
    capture_table(table_regex(), statement)
}

/// Like [`extract_table`] but also recognises `REPLACE INTO`.
pub fn extract_write_table(statement: &str) -> Option<String> {
    capture_table(write_table_regex(), statement)
}

fn capture_table(regex: &Regex, statement: &str) -> Option<String> {
    regex
        .captures(statement)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether the statement starts with `INSERT`, `UPDATE`, `DELETE` or `REPLACE`.
pub fn is_write_statement(statement: &str) -> bool {
    write_statement_regex().is_match(statement)
}

/// The body of the first `WHERE` clause, up to `ORDER BY`/`LIMIT`/`GROUP BY`/`HAVING`.
pub fn where_clause(statement: &str) -> Option<&str> {
    let start = where_regex().find(statement)?.end();
    let rest = &statement[start..];
    let end = where_end_regex()
        .find(rest)
        .map(|m| m.start())
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Split a `WHERE` body on `AND`/`OR` that are outside parentheses and quotes.
pub fn split_conditions(clause: &str) -> Vec<&str> {
    let bytes = clause.as_bytes();
    let mut fragments = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                if let Some(len) = boolean_keyword_at(bytes, i) {
                    push_fragment(&mut fragments, &clause[start..i]);
                    i += len;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    push_fragment(&mut fragments, &clause[start..]);
    fragments
}

fn push_fragment<'a>(fragments: &mut Vec<&'a str>, fragment: &'a str) {
    let fragment = fragment.trim();
    if !fragment.is_empty() {
        fragments.push(fragment);
    }
}

/// Length of an `AND`/`OR` keyword starting at `i` on word boundaries.
fn boolean_keyword_at(bytes: &[u8], i: usize) -> Option<usize> {
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';
    if i > 0 && is_word(bytes[i - 1]) {
        return None;
    }
    for keyword in [&b"AND"[..], &b"OR"[..]] {
        let end = i + keyword.len();
        if end <= bytes.len()
            && bytes[i..end].eq_ignore_ascii_case(keyword)
            && (end == bytes.len() || !is_word(bytes[end]))
        {
            return Some(keyword.len());
        }
    }
    None
}

/// Lowercased column name on the left of a comparison operator.
pub fn condition_column(fragment: &str) -> Option<String> {
    condition_column_regex()
        .captures(fragment)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Sorted column names referenced by the `WHERE` clause, if any.
pub fn where_columns(statement: &str) -> Option<Vec<String>> {
    let clause = where_clause(statement)?;
    let mut columns: Vec<String> = split_conditions(clause)
        .into_iter()
        .filter_map(condition_column)
        .collect();
    columns.sort();
    Some(columns)
}

/// Remove trailing whitespace and semicolons so clauses can be appended.
pub fn strip_terminator(statement: &str) -> &str {
    statement.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}
