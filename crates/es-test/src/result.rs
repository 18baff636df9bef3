//! Test outcome model

use chrono::{Local, NaiveDateTime};
use es_db::{DbError, ExecutionOutcome, FailureSample};

/// Timestamp format used in reports (second precision, no offset)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Result of a test that executed and produced a row count
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    /// Test name (lower-cased file stem)
    pub name: String,

    /// True iff the query returned no rows
    pub passed: bool,

    /// Execution time in seconds
    pub duration_secs: f64,

    /// SQL as read from the test file
    pub sql: String,

    /// Number of rows the query returned
    pub row_count: u64,

    /// Local wall-clock time of completion
    pub timestamp: NaiveDateTime,

    /// Present iff the test failed
    pub failure_message: Option<String>,

    /// Offending rows, when capture was requested and succeeded
    pub failure_sample: Option<FailureSample>,
}

impl TestResult {
    /// Build a result from a dispatch outcome, stamped with the current time
    pub fn from_outcome(name: impl Into<String>, outcome: ExecutionOutcome) -> Self {
        Self::at(name, outcome, Local::now().naive_local())
    }

    /// Build a result with an explicit completion time
    pub fn at(name: impl Into<String>, outcome: ExecutionOutcome, timestamp: NaiveDateTime) -> Self {
        let passed = outcome.row_count == 0;
        let failure_message = (!passed).then(|| failure_message(outcome.row_count));
        Self {
            name: name.into(),
            passed,
            duration_secs: outcome.elapsed_secs,
            sql: outcome.sql,
            row_count: outcome.row_count,
            timestamp,
            failure_message,
            failure_sample: None,
        }
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Message attached to a failed test
pub fn failure_message(row_count: u64) -> String {
    format!("Test returned {} rows. Expected 0 rows.", row_count)
}

/// A test that could not produce a row count
#[derive(Debug)]
pub struct TestError {
    pub name: String,
    pub error: DbError,
    pub timestamp: NaiveDateTime,
}

impl TestError {
    pub fn new(name: impl Into<String>, error: DbError) -> Self {
        Self {
            name: name.into(),
            error,
            timestamp: Local::now().naive_local(),
        }
    }
}

/// What a single worker reports back to the collector
#[derive(Debug)]
pub enum TestOutcome {
    Completed(TestResult),
    Errored(TestError),
}

impl TestOutcome {
    pub fn name(&self) -> &str {
        match self {
            TestOutcome::Completed(r) => &r.name,
            TestOutcome::Errored(e) => &e.name,
        }
    }
}

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    /// At least one test ran, nothing failed or errored
    Passed,
    /// A test failed or could not run
    Failed,
    /// No tests were executed
    NoTests,
}

impl RunVerdict {
    pub fn is_success(&self) -> bool {
        matches!(self, RunVerdict::Passed)
    }
}

/// Everything a run produced, in completion order
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<TestResult>,
    pub errors: Vec<TestError>,
    pub elapsed_secs: f64,
}

impl RunReport {
    /// Tests that executed or errored
    pub fn total(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Failed results in completion order
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn verdict(&self) -> RunVerdict {
        if self.total() == 0 {
            RunVerdict::NoTests
        } else if self.errors.is_empty() && self.results.iter().all(|r| r.passed) {
            RunVerdict::Passed
        } else {
            RunVerdict::Failed
        }
    }

    /// Sum of test durations, rounded to milliseconds
    pub fn total_duration_secs(&self) -> f64 {
        let sum: f64 = self.results.iter().map(|r| r.duration_secs).sum();
        (sum * 1000.0).round() / 1000.0
    }
}

#[cfg(test)]
#[path = "result_test.rs"]
mod tests;
