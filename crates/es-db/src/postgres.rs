//! PostgreSQL backend

use crate::error::{DbError, DbResult};
use crate::poll::{with_timeout, PollSettings};
use crate::sample::{CellValue, FailureSample, RowSet};
use crate::session::{apply_setup, dispatch_on, read_sql, sample_rows};
use crate::traits::{Backend, ExecutionOutcome, Session, SetupStatement};
use crate::APPLICATION_NAME;
use async_trait::async_trait;
use es_core::{Platform, PostgresProfile, TestSource};
use log::debug;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo};
use std::time::Duration;

/// Maximum time to wait for a connection to be established.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches tests over a fresh `PgConnection` per call
pub struct PostgresBackend {
    profile: PostgresProfile,
    poll: PollSettings,
}

impl PostgresBackend {
    pub fn new(profile: PostgresProfile, poll: PollSettings) -> Self {
        Self { profile, poll }
    }

    fn connect_options(&self) -> DbResult<PgConnectOptions> {
        let p = &self.profile;
        let mut options = PgConnectOptions::new()
            .host(&p.host)
            .port(p.port)
            .database(&p.database)
            .username(&p.user)
            .password(&p.password)
            .application_name(APPLICATION_NAME)
            .log_statements(log::LevelFilter::Debug);
        if let Some(mode) = &p.sslmode {
            let mode: PgSslMode = mode.parse().map_err(|e| {
                DbError::ConnectionError(format!("Invalid sslmode '{}': {}", mode, e))
            })?;
            options = options.ssl_mode(mode);
        }
        if let Some(timeout) = statement_timeout(self.poll.timeout) {
            options = options.options([("statement_timeout", timeout)]);
        }
        Ok(options)
    }

    async fn open(&self) -> DbResult<PostgresSession> {
        let options = self.connect_options()?;
        let conn = match tokio::time::timeout(CONNECT_TIMEOUT, PgConnection::connect_with(&options))
            .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(map_connection_error(e, &self.profile)),
            Err(_) => {
                return Err(DbError::ConnectionError(format!(
                    "Connection to {}:{} timed out",
                    self.profile.host, self.profile.port
                )))
            }
        };
        debug!(
            "Connected to postgres {}:{}/{}",
            self.profile.host, self.profile.port, self.profile.database
        );
        Ok(PostgresSession {
            conn,
            timeout: self.poll.timeout,
        })
    }

    fn setup_statements(&self) -> Vec<SetupStatement> {
        self.profile
            .schema
            .iter()
            .map(|schema| SetupStatement::SearchPath(schema.clone()))
            .collect()
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn platform(&self) -> Platform {
        Platform::Postgres
    }

    async fn dispatch_test(&self, source: &TestSource) -> DbResult<ExecutionOutcome> {
        let sql = read_sql(&source.path).await?;
        let mut session = self.open().await?;
        let outcome = dispatch_on(&mut session, &self.setup_statements(), sql).await;
        session.close().await;
        outcome
    }

    async fn fetch_failure_sample(&self, sql: &str, limit: usize) -> DbResult<FailureSample> {
        let mut session = self.open().await?;
        apply_setup(&mut session, &self.setup_statements()).await;
        let sample = sample_rows(&mut session, sql, limit).await;
        session.close().await;
        sample
    }
}

/// Server-side `statement_timeout` matching the client-side query bound.
///
/// Dropping a timed-out query future only abandons it on the client; the
/// server keeps executing until its own `statement_timeout` fires.
fn statement_timeout(timeout: Option<Duration>) -> Option<String> {
    timeout.map(|t| format!("{}ms", t.as_millis().max(1)))
}

/// One open PostgreSQL connection
///
/// Every call runs under the query timeout. When it expires the client gives
/// up immediately and the connection's `statement_timeout` stops the query on
/// the server.
pub struct PostgresSession {
    conn: PgConnection,
    timeout: Option<Duration>,
}

impl PostgresSession {
    async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!("Error closing postgres connection: {}", e);
        }
    }
}

#[async_trait]
impl Session for PostgresSession {
    async fn apply(&mut self, statement: &SetupStatement) -> DbResult<()> {
        let sql = statement.sql();
        let conn = &mut self.conn;
        with_timeout(self.timeout, async move {
            conn.execute(sql.as_str()).await?;
            Ok(())
        })
        .await
    }

    async fn query(&mut self, sql: &str, limit: Option<usize>) -> DbResult<RowSet> {
        let conn = &mut self.conn;
        with_timeout(self.timeout, async move {
            let rows: Vec<PgRow> = sqlx::query(sql).fetch_all(&mut *conn).await?;
            let columns = match rows.first() {
                Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
                None => conn
                    .describe(sql)
                    .await?
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
            };
            let take = limit.unwrap_or(rows.len());
            let rows = rows.iter().take(take).map(convert_row).collect();
            Ok(RowSet::new(columns, rows))
        })
        .await
    }
}

/// Converts a sqlx PgRow to cells.
fn convert_row(row: &PgRow) -> Vec<CellValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decode a nullable column, keeping NULL and decode failures distinct.
fn decode<'r, T, F>(row: &'r PgRow, index: usize, type_name: &str, map: F) -> CellValue
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: FnOnce(T) -> CellValue,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(Some(v)) => map(v),
        Ok(None) => CellValue::Null,
        Err(_) => CellValue::Text(format!("<{}>", type_name.to_lowercase())),
    }
}

/// Converts a single column value by its Postgres type name.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> CellValue {
    use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    match type_name.to_uppercase().as_str() {
        "BOOL" => decode::<bool, _>(row, index, type_name, CellValue::Bool),
        "INT2" => decode::<i16, _>(row, index, type_name, |v| CellValue::Int(v as i64)),
        "INT4" => decode::<i32, _>(row, index, type_name, |v| CellValue::Int(v as i64)),
        "INT8" => decode::<i64, _>(row, index, type_name, CellValue::Int),
        "FLOAT4" => decode::<f32, _>(row, index, type_name, |v| CellValue::Float(v as f64)),
        "FLOAT8" => decode::<f64, _>(row, index, type_name, CellValue::Float),
        "NUMERIC" => decode::<sqlx::types::Decimal, _>(row, index, type_name, |v| {
            CellValue::Text(v.to_string())
        }),
        "DATE" => decode::<NaiveDate, _>(row, index, type_name, |v| CellValue::Text(v.to_string())),
        "TIME" => decode::<NaiveTime, _>(row, index, type_name, |v| CellValue::Text(v.to_string())),
        "TIMESTAMP" => decode::<NaiveDateTime, _>(row, index, type_name, |v| {
            CellValue::Text(v.to_string())
        }),
        "TIMESTAMPTZ" => decode::<DateTime<Utc>, _>(row, index, type_name, |v| {
            CellValue::Text(v.to_rfc3339())
        }),
        "UUID" => decode::<sqlx::types::Uuid, _>(row, index, type_name, |v| {
            CellValue::Text(v.to_string())
        }),
        "JSON" | "JSONB" => decode::<sqlx::types::JsonValue, _>(row, index, type_name, |v| {
            CellValue::Text(v.to_string())
        }),
        "BYTEA" => decode::<Vec<u8>, _>(row, index, type_name, |v| {
            CellValue::Text(format!("\\x{}", hex(&v)))
        }),
        // Text-like types and anything else that decodes as a string
        _ => decode::<String, _>(row, index, type_name, CellValue::Text),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Maps sqlx connection errors to readable messages.
fn map_connection_error(error: sqlx::Error, profile: &PostgresProfile) -> DbError {
    let host = &profile.host;
    let port = profile.port;
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        DbError::ConnectionError(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        DbError::ConnectionError(format!(
            "Authentication failed for user '{}'. Check your credentials.",
            profile.user
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        DbError::ConnectionError(format!("Database '{}' does not exist.", profile.database))
    } else {
        DbError::ConnectionError(error.to_string())
    }
}
