//! Backend and session traits

use crate::error::DbResult;
use crate::sample::{FailureSample, RowSet};
use async_trait::async_trait;
use es_core::{Platform, TestSource};

/// Outcome of dispatching one test
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Number of rows the test query produced
    pub row_count: u64,
    /// Wall-clock seconds spent executing the wrapped query, rounded to milliseconds
    pub elapsed_secs: f64,
    /// The test file contents as read from disk
    pub sql: String,
}

/// Environment setup issued before the test query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStatement {
    UseCatalog(String),
    UseSchema(String),
    SearchPath(String),
}

impl SetupStatement {
    pub fn sql(&self) -> String {
        match self {
            SetupStatement::UseCatalog(catalog) => format!("USE CATALOG {}", catalog),
            SetupStatement::UseSchema(schema) => format!("USE SCHEMA {}", schema),
            SetupStatement::SearchPath(schema) => format!("SET search_path TO {}", schema),
        }
    }
}

/// A single connection to a warehouse, owned by one dispatch call
#[async_trait]
pub trait Session: Send {
    /// Run a setup statement against this session
    async fn apply(&mut self, statement: &SetupStatement) -> DbResult<()>;

    /// Execute a query and return at most `limit` rows (all rows when `None`)
    async fn query(&mut self, sql: &str, limit: Option<usize>) -> DbResult<RowSet>;
}

/// Per-platform test dispatcher.
///
/// Implementations must be safe to call concurrently from many tasks; each
/// call opens and owns its own connection.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Platform this backend talks to
    fn platform(&self) -> Platform;

    /// Read the test file, run environment setup, and count the rows the
    /// test query produces
    async fn dispatch_test(&self, source: &TestSource) -> DbResult<ExecutionOutcome>;

    /// Fetch up to `limit` rows of a failing test's output
    async fn fetch_failure_sample(&self, sql: &str, limit: usize) -> DbResult<FailureSample>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_statement_sql() {
        assert_eq!(
            SetupStatement::UseCatalog("main".into()).sql(),
            "USE CATALOG main"
        );
        assert_eq!(
            SetupStatement::UseSchema("analytics".into()).sql(),
            "USE SCHEMA analytics"
        );
        assert_eq!(
            SetupStatement::SearchPath("reporting".into()).sql(),
            "SET search_path TO reporting"
        );
    }
}
