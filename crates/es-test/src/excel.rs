//! Workbook of failing-row samples, one worksheet per failed test

use crate::error::{ExportError, ExportResult};
use crate::output::prepare_output_path;
use crate::result::{RunReport, TestResult};
use es_db::CellValue;
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Longest worksheet name the format allows
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Longest string a single cell may hold
pub const MAX_CELL_LEN: usize = 32_767;

const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];
const MIN_COLUMN_WIDTH: usize = 10;
const MAX_COLUMN_WIDTH: usize = 80;

/// Largest integer a spreadsheet number stores exactly
const MAX_EXACT_INT: u64 = 1 << 53;

/// Write every failed test in `report` to a workbook and return the absolute path.
///
/// `sample_limit` only feeds the "showing first N" label; samples are
/// already capped when captured.
pub fn write_failure_workbook(
    report: &RunReport,
    path: &Path,
    sample_limit: usize,
) -> ExportResult<PathBuf> {
    let path = prepare_output_path(path, "xlsx")?;
    let mut workbook = build_workbook(report, sample_limit).map_err(|source| {
        ExportError::Workbook {
            path: path.display().to_string(),
            source,
        }
    })?;
    workbook
        .save(&path)
        .map_err(|source| ExportError::Workbook {
            path: path.display().to_string(),
            source,
        })?;
    Ok(path)
}

fn build_workbook(report: &RunReport, sample_limit: usize) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let label = Format::new().set_bold();
    let header = Format::new().set_bold();
    let wrapped = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    let mut used = HashSet::new();
    let mut any = false;
    for result in report.failures() {
        any = true;
        let sheet = workbook.add_worksheet();
        sheet.set_name(sanitize_sheet_name(&result.name, &mut used))?;
        write_failure_sheet(sheet, result, sample_limit, &label, &header, &wrapped)?;
    }

    if !any {
        let sheet = workbook.add_worksheet();
        sheet.set_name("No Failures")?;
        sheet.write_string(0, 0, "No failed tests to export.")?;
    }
    Ok(workbook)
}

fn write_failure_sheet(
    sheet: &mut Worksheet,
    result: &TestResult,
    sample_limit: usize,
    label: &Format,
    header: &Format,
    wrapped: &Format,
) -> Result<(), XlsxError> {
    let mut widths = ColumnWidths::default();

    let metadata = [
        ("Test Name:", result.name.clone()),
        (
            "Execution Time:",
            format!("{:.3} seconds", result.duration_secs),
        ),
        (
            "Failed With:",
            format!(
                "{} rows (showing first {})",
                result.row_count,
                group_thousands(sample_limit)
            ),
        ),
        ("SQL Query:", result.sql.clone()),
        ("Execution Timestamp:", result.timestamp_string()),
    ];

    let mut row: u32 = 0;
    for (name, value) in &metadata {
        sheet.write_string_with_format(row, 0, *name, label)?;
        sheet.write_string_with_format(row, 1, truncate_cell(value), wrapped)?;
        widths.observe(0, name);
        widths.observe(1, value);
        row += 1;
    }

    // Blank line between metadata and the sample.
    row += 1;
    let header_row = row;

    if let Some(sample) = &result.failure_sample {
        for (col, name) in sample.columns.iter().enumerate() {
            let col = col as u16;
            sheet.write_string_with_format(header_row, col, truncate_cell(name), header)?;
            widths.observe(col, name);
        }
        for values in &sample.rows {
            row += 1;
            for (col, value) in values.iter().enumerate() {
                let col = col as u16;
                write_cell(sheet, row, col, value)?;
                widths.observe(col, &value.to_string());
            }
        }
    }

    sheet.set_freeze_panes(header_row + 1, 0)?;
    for (col, width) in widths.iter() {
        sheet.set_column_width(col, width as f64)?;
    }
    Ok(())
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<(), XlsxError> {
    match value {
        CellValue::Null => {}
        CellValue::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        CellValue::Int(i) if i.unsigned_abs() <= MAX_EXACT_INT => {
            sheet.write_number(row, col, *i as f64)?;
        }
        CellValue::Float(x) if x.is_finite() => {
            sheet.write_number(row, col, *x)?;
        }
        other => {
            sheet.write_string(row, col, truncate_cell(&other.to_string()))?;
        }
    }
    Ok(())
}

fn truncate_cell(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Widest rendered value per column
#[derive(Default)]
struct ColumnWidths(Vec<usize>);

impl ColumnWidths {
    fn observe(&mut self, col: u16, text: &str) {
        let col = col as usize;
        if self.0.len() <= col {
            self.0.resize(col + 1, 0);
        }
        let len = text.chars().count();
        if len > self.0[col] {
            self.0[col] = len;
        }
    }

    fn iter(&self) -> impl Iterator<Item = (u16, usize)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(col, len)| (col as u16, column_width(*len)))
    }
}

/// Display width for a column whose longest value has `len` characters
pub fn column_width(len: usize) -> usize {
    (len + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

/// Turn a test name into a valid worksheet name not yet in `used`.
///
/// Invalid characters become `_`, the result is cut to 31 characters and
/// trimmed, and clashes (compared case-insensitively) get a ` (n)` suffix
/// while staying within the length limit.
pub fn sanitize_sheet_name(name: &str, used: &mut HashSet<String>) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    let mut base = trim_sheet_name(&replaced).to_string();
    if base.is_empty() {
        base = "Sheet".to_string();
    }
    // Reserved by the spreadsheet application.
    if base.eq_ignore_ascii_case("history") {
        base.push('_');
    }

    let mut candidate = base.clone();
    let mut i = 1;
    while used.contains(&candidate.to_lowercase()) {
        let suffix = format!(" ({})", i);
        let keep = MAX_SHEET_NAME_LEN - suffix.chars().count();
        let trimmed: String = base.chars().take(keep).collect();
        candidate = format!("{}{}", trim_sheet_name(&trimmed), suffix);
        i += 1;
    }
    used.insert(candidate.to_lowercase());
    candidate
}

/// Sheet names may not start or end with an apostrophe
fn trim_sheet_name(name: &str) -> &str {
    name.trim_matches(|c: char| c == '\'' || c.is_whitespace())
}

/// 1000 -> "1,000"
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
#[path = "excel_test.rs"]
mod tests;
