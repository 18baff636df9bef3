//! JUnit XML report

use crate::error::{ExportError, ExportResult};
use crate::output::prepare_output_path;
use crate::result::{RunReport, TIMESTAMP_FORMAT};
use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Name of the single test suite in the report
pub const SUITE_NAME: &str = "EchoSphere SQL Tests";

/// Classname attached to every test case
pub const CLASSNAME: &str = "echosphere.sql_tests";

/// Write the report as JUnit XML and return the absolute path written.
///
/// `.xml` is appended when the path does not already end with it, and
/// missing parent directories are created.
pub fn write_junit(report: &RunReport, path: &Path) -> ExportResult<PathBuf> {
    let path = prepare_output_path(path, "xml")?;
    let write_err = |source| ExportError::Write {
        path: path.display().to_string(),
        source,
    };

    let file = File::create(&path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    write_junit_xml(report, &mut writer).map_err(write_err)?;
    writer.flush().map_err(write_err)?;
    Ok(path)
}

/// Render the report as a JUnit XML document
pub fn render_junit(report: &RunReport) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_junit_xml(report, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_junit_xml(report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
    let timestamp = report
        .results
        .first()
        .map(|r| r.timestamp)
        .or_else(|| report.errors.first().map(|e| e.timestamp))
        .unwrap_or_else(|| Local::now().naive_local())
        .format(TIMESTAMP_FORMAT)
        .to_string();

    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(writer, "<testsuites>")?;
    writeln!(
        writer,
        r#"  <testsuite name="{}" tests="{}" failures="{}" errors="{}" skipped="0" time="{:.3}" timestamp="{}">"#,
        SUITE_NAME,
        report.total(),
        report.failed_count(),
        report.error_count(),
        report.total_duration_secs(),
        timestamp
    )?;

    for result in &report.results {
        writeln!(
            writer,
            r#"    <testcase name="{}" classname="{}" time="{:.3}">"#,
            escape_xml(&result.name),
            CLASSNAME,
            result.duration_secs
        )?;
        if !result.passed {
            let message = result.failure_message.as_deref().unwrap_or("Test failed");
            let details = format!(
                "\nSQL:\n{}\n\nExecution time: {:.3}s\nRow count: {}\n",
                result.sql, result.duration_secs, result.row_count
            );
            writeln!(
                writer,
                r#"      <failure message="{}">{}</failure>"#,
                escape_xml(message),
                escape_xml(&details)
            )?;
        }
        writeln!(writer, "    </testcase>")?;
    }

    for error in &report.errors {
        let message = error.error.to_string();
        writeln!(
            writer,
            r#"    <testcase name="{}" classname="{}" time="0.000">"#,
            escape_xml(&error.name),
            CLASSNAME
        )?;
        writeln!(
            writer,
            r#"      <error message="{}" type="{}">{}</error>"#,
            escape_xml(&message),
            error.error.category(),
            escape_xml(&message)
        )?;
        writeln!(writer, "    </testcase>")?;
    }

    writeln!(writer, "  </testsuite>")?;
    writeln!(writer, "</testsuites>")?;
    Ok(())
}

/// Escape XML special characters and drop characters XML 1.0 cannot carry
fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c < '\u{20}' || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "junit_test.rs"]
mod tests;
