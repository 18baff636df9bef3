//! Platform-independent dispatch steps shared by every backend

use crate::error::{DbError, DbResult};
use crate::sample::{CellValue, FailureSample, RowSet};
use crate::traits::{ExecutionOutcome, Session, SetupStatement};
use es_core::sql_utils::{count_query, sample_query};
use std::path::Path;
use std::time::{Duration, Instant};

/// Read a test file's SQL
pub async fn read_sql(path: &Path) -> DbResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DbError::SqlFileRead {
            path: path.display().to_string(),
            source,
        })
}

/// Apply setup statements in order.
///
/// A failed statement is logged and skipped; the test query still runs
/// against whatever context the session ended up with. Returns the
/// statements that failed.
pub async fn apply_setup<S>(session: &mut S, statements: &[SetupStatement]) -> Vec<SetupStatement>
where
    S: Session + ?Sized,
{
    let mut failed = Vec::new();
    for statement in statements {
        if let Err(e) = session.apply(statement).await {
            log::warn!("Setup statement '{}' failed, continuing: {}", statement.sql(), e);
            failed.push(statement.clone());
        }
    }
    failed
}

/// Run the count-wrapped test query and time it
pub async fn count_rows<S>(session: &mut S, sql: String) -> DbResult<ExecutionOutcome>
where
    S: Session + ?Sized,
{
    let wrapped = count_query(&sql);
    let start = Instant::now();
    let rows = session.query(&wrapped, Some(1)).await?;
    let elapsed_secs = round_secs(start.elapsed());
    let row_count = parse_count(&rows)?;
    Ok(ExecutionOutcome {
        row_count,
        elapsed_secs,
        sql,
    })
}

/// Run the limit-wrapped test query
pub async fn sample_rows<S>(session: &mut S, sql: &str, limit: usize) -> DbResult<FailureSample>
where
    S: Session + ?Sized,
{
    let mut rows = session.query(&sample_query(sql, limit), Some(limit)).await?;
    rows.rows.truncate(limit);
    Ok(rows)
}

/// Setup, then count. Every backend's `dispatch_test` is this with its own session.
pub async fn dispatch_on<S>(
    session: &mut S,
    setup: &[SetupStatement],
    sql: String,
) -> DbResult<ExecutionOutcome>
where
    S: Session + ?Sized,
{
    apply_setup(session, setup).await;
    count_rows(session, sql).await
}

/// Read the first cell of a COUNT(*) result as a non-negative integer
pub fn parse_count(rows: &RowSet) -> DbResult<u64> {
    let value = rows.first_value().ok_or(DbError::NoRowReturned)?;
    match value {
        CellValue::Int(n) if *n >= 0 => Ok(*n as u64),
        CellValue::Float(x) if *x >= 0.0 && x.fract() == 0.0 && *x <= u64::MAX as f64 => {
            Ok(*x as u64)
        }
        CellValue::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| DbError::InvalidCount(format!("'{}'", s))),
        CellValue::Null => Err(DbError::InvalidCount("NULL".to_string())),
        other => Err(DbError::InvalidCount(other.to_string())),
    }
}

/// Seconds rounded to millisecond precision
pub fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
