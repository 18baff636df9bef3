//! SQL wrapping utilities
//!
//! Test queries are never parsed. They are wrapped as a derived table so the
//! warehouse computes the row count (or a bounded sample) itself. The closing
//! parenthesis goes on its own line so a trailing `-- comment` in the test
//! file cannot swallow it.

/// Strip surrounding whitespace and trailing statement terminators.
///
/// # Examples
/// ```
/// use es_core::sql_utils::strip_terminator;
/// assert_eq!(strip_terminator("  SELECT 1;;\n"), "SELECT 1");
/// ```
pub fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Wrap a test query so it returns a single row count.
///
/// # Examples
/// ```
/// use es_core::sql_utils::count_query;
/// assert_eq!(count_query("SELECT * FROM t;"), "SELECT COUNT(*) FROM (\nSELECT * FROM t\n) AS t");
/// ```
pub fn count_query(sql: &str) -> String {
    format!("SELECT COUNT(*) FROM (\n{}\n) AS t", strip_terminator(sql))
}

/// Wrap a test query so it returns at most `limit` of its rows.
///
/// # Examples
/// ```
/// use es_core::sql_utils::sample_query;
/// assert_eq!(sample_query("SELECT a FROM t", 10), "SELECT * FROM (\nSELECT a FROM t\n) AS t LIMIT 10");
/// ```
pub fn sample_query(sql: &str, limit: usize) -> String {
    format!(
        "SELECT * FROM (\n{}\n) AS t LIMIT {}",
        strip_terminator(sql),
        limit
    )
}

#[cfg(test)]
#[path = "sql_utils_test.rs"]
mod tests;
