//! Snowflake backend over the SQL API (v2)
//!
//! Statements are submitted asynchronously and polled by handle until they
//! finish. Warehouse, role, database and schema travel in every request, so
//! there is no separate session setup.

use crate::error::{DbError, DbResult};
use crate::poll::{poll_until_done, PollSettings, PollState};
use crate::sample::{CellValue, FailureSample, RowSet};
use crate::session::{dispatch_on, read_sql, sample_rows};
use crate::traits::{Backend, ExecutionOutcome, Session, SetupStatement};
use crate::{APPLICATION_NAME, QUERY_TAG};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use es_core::{Platform, SnowflakeProfile, TestSource};
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Dispatches tests through the Snowflake SQL API
pub struct SnowflakeBackend {
    profile: SnowflakeProfile,
    poll: PollSettings,
}

impl SnowflakeBackend {
    pub fn new(profile: SnowflakeProfile, poll: PollSettings) -> Self {
        Self { profile, poll }
    }

    fn open(&self) -> DbResult<SnowflakeSession<'_>> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", APPLICATION_NAME, env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DbError::ConnectionError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(SnowflakeSession {
            client,
            profile: &self.profile,
            base_url: self.profile.base_url(),
            poll: self.poll,
        })
    }
}

#[async_trait]
impl Backend for SnowflakeBackend {
    fn platform(&self) -> Platform {
        Platform::Snowflake
    }

    async fn dispatch_test(&self, source: &TestSource) -> DbResult<ExecutionOutcome> {
        let sql = read_sql(&source.path).await?;
        let mut session = self.open()?;
        dispatch_on(&mut session, &[], sql).await
    }

    async fn fetch_failure_sample(&self, sql: &str, limit: usize) -> DbResult<FailureSample> {
        let mut session = self.open()?;
        sample_rows(&mut session, sql, limit).await
    }
}

/// HTTP client bound to one account; owned by a single dispatch call
pub struct SnowflakeSession<'a> {
    client: Client,
    profile: &'a SnowflakeProfile,
    base_url: String,
    poll: PollSettings,
}

impl<'a> SnowflakeSession<'a> {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.profile.token)
            .header(TOKEN_TYPE_HEADER, &self.profile.token_type)
            .header(ACCEPT, "application/json")
    }

    /// Submit a statement and return its handle
    async fn submit(&self, sql: &str) -> DbResult<String> {
        let body = submit_body(self.profile, sql, self.poll.timeout);
        let request_id = uuid::Uuid::new_v4().to_string();
        let response = self
            .request(Method::POST, STATEMENTS_PATH)
            .header(CONTENT_TYPE, "application/json")
            .query(&[("requestId", request_id.as_str()), ("async", "true")])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        match status.as_u16() {
            200 | 202 => parse_body(&text)?.statement_handle.ok_or_else(|| {
                DbError::PollError("Submission response carried no statementHandle".into())
            }),
            _ => {
                interpret(status, &text)?;
                Err(DbError::PollError(format!(
                    "Statement submission was not accepted ({})",
                    status
                )))
            }
        }
    }

    async fn status(&self, handle: &str) -> DbResult<PollState<StatementResponse>> {
        let response = self
            .request(Method::GET, &format!("{}/{}", STATEMENTS_PATH, handle))
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        interpret(status, &text)
    }

    async fn partition(&self, handle: &str, index: usize) -> DbResult<Vec<Vec<Option<String>>>> {
        let response = self
            .request(Method::GET, &format!("{}/{}", STATEMENTS_PATH, handle))
            .query(&[("partition", index)])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        match interpret(status, &text)? {
            PollState::Done(body) => Ok(body.data),
            PollState::Running => Err(DbError::PollError(format!(
                "Partition {} of {} was not ready",
                index, handle
            ))),
        }
    }

    async fn cancel(&self, handle: &str) {
        let result = self
            .request(Method::POST, &format!("{}/{}/cancel", STATEMENTS_PATH, handle))
            .send()
            .await;
        match result {
            Ok(r) if r.status().is_success() => debug!("Cancelled Snowflake statement {}", handle),
            Ok(r) => warn!("Cancel of Snowflake statement {} returned {}", handle, r.status()),
            Err(e) => warn!("Cancel of Snowflake statement {} failed: {}", handle, e),
        }
    }
}

#[async_trait]
impl<'a> Session for SnowflakeSession<'a> {
    async fn apply(&mut self, statement: &SetupStatement) -> DbResult<()> {
        Err(DbError::ExecutionError(format!(
            "Setup statement '{}' is not used on Snowflake",
            statement.sql()
        )))
    }

    async fn query(&mut self, sql: &str, limit: Option<usize>) -> DbResult<RowSet> {
        let handle = self.submit(sql).await?;
        debug!("Submitted Snowflake statement {}", handle);

        let result = poll_until_done(&self.poll, || self.status(&handle)).await;
        let first = match result {
            Ok(body) => body,
            Err(e @ DbError::Timeout(_)) => {
                self.cancel(&handle).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let meta = first.result_set_meta_data.ok_or_else(|| {
            DbError::PollError("Result carried no resultSetMetaData".to_string())
        })?;
        let limit = limit.unwrap_or(usize::MAX);
        let mut raw = first.data;
        let mut next = 1;
        while raw.len() < limit && next < meta.partition_info.len() {
            raw.extend(self.partition(&handle, next).await?);
            next += 1;
        }
        raw.truncate(limit);
        Ok(to_row_set(&meta.row_type, raw))
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    parameters: SubmitParameters<'a>,
}

#[derive(Debug, Serialize)]
struct SubmitParameters<'a> {
    query_tag: &'a str,
}

fn submit_body<'a>(
    profile: &'a SnowflakeProfile,
    sql: &'a str,
    timeout: Option<Duration>,
) -> SubmitRequest<'a> {
    SubmitRequest {
        statement: sql,
        timeout: timeout.map(|t| t.as_secs().max(1)),
        warehouse: profile.warehouse.as_deref(),
        role: profile.role.as_deref(),
        database: profile.database.as_deref(),
        schema: profile.schema.as_deref(),
        parameters: SubmitParameters { query_tag: QUERY_TAG },
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
    #[serde(default)]
    partition_info: Vec<serde::de::IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    scale: Option<i64>,
}

fn parse_body(text: &str) -> DbResult<StatementResponse> {
    serde_json::from_str(text)
        .map_err(|e| DbError::PollError(format!("Malformed Snowflake response: {}", e)))
}

fn error_message(text: &str) -> String {
    match serde_json::from_str::<StatementResponse>(text) {
        Ok(StatementResponse {
            message: Some(m), ..
        }) => m,
        _ => text.trim().to_string(),
    }
}

/// Map an SQL API response to a poll state or error
fn interpret(status: StatusCode, text: &str) -> DbResult<PollState<StatementResponse>> {
    match status.as_u16() {
        200 => Ok(PollState::Done(parse_body(text)?)),
        202 => Ok(PollState::Running),
        // Throttling and transient unavailability: keep polling.
        429 | 503 | 504 => Ok(PollState::Running),
        401 | 403 => Err(DbError::ConnectionError(format!(
            "Snowflake rejected the credentials ({}): {}",
            status,
            error_message(text)
        ))),
        422 => Err(DbError::ExecutionError(error_message(text))),
        _ => Err(DbError::PollError(format!(
            "Unexpected Snowflake response {}: {}",
            status,
            error_message(text)
        ))),
    }
}

fn to_row_set(row_type: &[ColumnType], raw: Vec<Vec<Option<String>>>) -> RowSet {
    let columns = row_type.iter().map(|c| c.name.clone()).collect();
    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(i, value)| match row_type.get(i) {
                    Some(column) => convert_value(value, column),
                    None => value.map(CellValue::Text).unwrap_or(CellValue::Null),
                })
                .collect()
        })
        .collect();
    RowSet::new(columns, rows)
}

/// Converts an SQL API string cell using its column's `rowType` entry.
fn convert_value(raw: Option<String>, column: &ColumnType) -> CellValue {
    let Some(raw) = raw else {
        return CellValue::Null;
    };
    match column.type_name.to_lowercase().as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => {
            raw.parse::<i64>().map(CellValue::Int).unwrap_or(CellValue::Text(raw))
        }
        "real" => raw.parse::<f64>().map(CellValue::Float).unwrap_or(CellValue::Text(raw)),
        "boolean" => match raw.to_lowercase().as_str() {
            "true" | "1" => CellValue::Bool(true),
            "false" | "0" => CellValue::Bool(false),
            _ => CellValue::Text(raw),
        },
        "date" => raw
            .parse::<i64>()
            .ok()
            .and_then(date_from_epoch_days)
            .map(|d| CellValue::Text(d.to_string()))
            .unwrap_or(CellValue::Text(raw)),
        "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => epoch_to_text(&raw)
            .map(CellValue::Text)
            .unwrap_or(CellValue::Text(raw)),
        _ => CellValue::Text(raw),
    }
}

/// Days from 0001-01-01 to 1970-01-01
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Days since 1970-01-01 to a calendar date; out-of-range values give `None`
fn date_from_epoch_days(days: i64) -> Option<NaiveDate> {
    let days = i32::try_from(days).ok()?.checked_add(EPOCH_DAYS_FROM_CE)?;
    NaiveDate::from_num_days_from_ce_opt(days)
}

/// "seconds.nanos" (optionally followed by a timezone offset) to an ISO timestamp
fn epoch_to_text(raw: &str) -> Option<String> {
    let epoch = raw.split_whitespace().next()?;
    if epoch.starts_with('-') {
        return None;
    }
    let (secs, nanos) = match epoch.split_once('.') {
        Some((s, frac)) => {
            let digits = format!("{:0<9}", frac);
            (s.parse::<i64>().ok()?, digits.get(..9)?.parse::<u32>().ok()?)
        }
        None => (epoch.parse::<i64>().ok()?, 0),
    };
    let ts = DateTime::from_timestamp(secs, nanos)?;
    Some(ts.naive_utc().to_string())
}

#[cfg(test)]
#[path = "snowflake_test.rs"]
mod tests;
