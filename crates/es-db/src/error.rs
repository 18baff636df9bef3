//! Error types for es-db

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop a single test from producing a row count
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// The count query returned no row (D003)
    #[error("[D003] Query returned no row; expected a single COUNT(*) row")]
    NoRowReturned,

    /// The count value could not be read as a non-negative integer (D004)
    #[error("[D004] Unexpected COUNT(*) result: {0}")]
    InvalidCount(String),

    /// Job submission or status polling failed (D005)
    #[error("[D005] Query job polling failed: {0}")]
    PollError(String),

    /// Query did not reach a terminal state in time (D006)
    #[error("[D006] Query did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Test file could not be read (D007)
    #[error("[D007] Failed to read test file '{path}': {source}")]
    SqlFileRead {
        path: String,
        source: std::io::Error,
    },

    /// Internal error (D008)
    #[error("[D008] Internal error: {0}")]
    Internal(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

/// Coarse attribution of a `DbError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The warehouse could not be reached or did not answer in time
    Connectivity,
    /// The warehouse rejected the query, or the query text was unreadable
    Query,
    /// The query ran but its result was not a usable row count
    ResultShape,
    /// A bug or panic inside the runner
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Connectivity => "connectivity",
            ErrorCategory::Query => "query",
            ErrorCategory::ResultShape => "result_shape",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DbError {
    /// Which part of the pipeline failed
    pub fn category(&self) -> ErrorCategory {
        match self {
            DbError::ConnectionError(_) | DbError::PollError(_) | DbError::Timeout(_) => {
                ErrorCategory::Connectivity
            }
            DbError::ExecutionError(_) | DbError::SqlFileRead { .. } => ErrorCategory::Query,
            DbError::NoRowReturned | DbError::InvalidCount(_) => ErrorCategory::ResultShape,
            DbError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => DbError::ConnectionError(err.to_string()),
            sqlx::Error::RowNotFound => DbError::NoRowReturned,
            sqlx::Error::Database(db_err) => {
                let mut message = db_err.message().to_string();
                if let Some(pg) = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
                    if let Some(detail) = pg.detail() {
                        message.push_str(&format!(" (detail: {})", detail));
                    }
                    if let Some(hint) = pg.hint() {
                        message.push_str(&format!(" (hint: {})", hint));
                    }
                }
                DbError::ExecutionError(message)
            }
            other => DbError::ExecutionError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for DbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DbError::PollError(format!("Malformed response: {}", err))
        } else {
            DbError::ConnectionError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            DbError::ConnectionError("refused".into()).category(),
            ErrorCategory::Connectivity
        );
        assert_eq!(
            DbError::Timeout(Duration::from_secs(5)).category(),
            ErrorCategory::Connectivity
        );
        assert_eq!(
            DbError::ExecutionError("syntax".into()).category(),
            ErrorCategory::Query
        );
        assert_eq!(DbError::NoRowReturned.category(), ErrorCategory::ResultShape);
        assert_eq!(
            DbError::InvalidCount("abc".into()).category(),
            ErrorCategory::ResultShape
        );
        assert_eq!(
            DbError::Internal("panic".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_timeout_message_in_seconds() {
        let err = DbError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "[D006] Query did not finish within 90s");
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_no_row() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NoRowReturned));
    }
}
