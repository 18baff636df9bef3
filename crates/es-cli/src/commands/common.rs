//! Shared helpers for CLI commands

use anyhow::{Context, Result};
use es_core::{discover_tests, TestSource};
use std::path::Path;

/// Printed when a suite has nothing to run or list
pub(crate) const NO_TESTS_MESSAGE: &str = "No tests detected.";

/// Exit code for failed runs, zero tests and lookup errors
pub(crate) const FAILURE_EXIT_CODE: i32 = -1;

/// Discover tests under `suite_dir`, optionally limited to one sub-suite.
///
/// Sources come back sorted by name.
pub(crate) fn discover(suite_dir: &Path, suite: Option<&str>) -> Result<Vec<TestSource>> {
    let tests = discover_tests(suite_dir, suite).with_context(|| {
        format!("Failed to discover tests in {}", suite_dir.display())
    })?;
    Ok(tests.into_values().collect())
}

/// Rows for the discovered-tests table
pub(crate) fn test_rows(sources: &[TestSource]) -> Vec<Vec<String>> {
    sources
        .iter()
        .map(|s| {
            vec![
                s.display_name(),
                s.subgroup.clone().unwrap_or_else(|| "-".to_string()),
                s.path.display().to_string(),
            ]
        })
        .collect()
}

/// Print the discovered-tests table
pub(crate) fn print_test_table(sources: &[TestSource]) {
    print_table(&["TEST", "SUITE", "FILE"], &test_rows(sources));
}

pub(crate) fn print_banner(title: &str) {
    println!("{}", "=".repeat(64));
    println!("{}", title);
    println!("{}", "=".repeat(64));
}

/// Calculate column widths for a table given headers and row data.
///
/// For each column, returns the maximum width across the header and all
/// row values so that data aligns when printed with left-padding.
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

/// Print a formatted table to stdout.
///
/// A left-aligned header row, a separator line of dashes, then each data
/// row. Columns are separated by two spaces.
///
/// ```ignore
/// print_table(&["TEST", "SUITE"], &[vec!["orders_fk".into(), "-".into()]]);
/// // TEST       SUITE
/// // ---------  -----
/// // orders_fk  -
/// ```
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in render_table(headers, rows) {
        println!("{}", line);
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let widths = calculate_column_widths(headers, rows);
    let mut lines = Vec::with_capacity(rows.len() + 2);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    lines.push(header_parts.join("  ").trim_end().to_string());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    lines.push(sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        lines.push(row_parts.join("  ").trim_end().to_string());
    }
    lines
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
