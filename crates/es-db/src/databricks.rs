//! Databricks backend over the SQL Statement Execution API (2.0)
//!
//! The REST API has no server-side session, so `USE CATALOG` / `USE SCHEMA`
//! are executed once to validate them and, on success, the catalog and schema
//! are carried on every later statement of the same dispatch call.

use crate::error::{DbError, DbResult};
use crate::poll::{poll_until_done, PollSettings, PollState};
use crate::sample::{CellValue, FailureSample, RowSet};
use crate::session::{apply_setup, dispatch_on, read_sql, sample_rows};
use crate::traits::{Backend, ExecutionOutcome, Session, SetupStatement};
use crate::APPLICATION_NAME;
use async_trait::async_trait;
use es_core::{DatabricksProfile, Platform, TestSource};
use log::{debug, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";
/// Longest synchronous wait the API allows before falling back to polling
const WAIT_TIMEOUT: &str = "10s";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Dispatches tests to a Databricks SQL warehouse
pub struct DatabricksBackend {
    profile: DatabricksProfile,
    poll: PollSettings,
}

impl DatabricksBackend {
    pub fn new(profile: DatabricksProfile, poll: PollSettings) -> Self {
        Self { profile, poll }
    }

    fn open(&self) -> DbResult<DatabricksSession<'_>> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", APPLICATION_NAME, env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DbError::ConnectionError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(DatabricksSession {
            client,
            profile: &self.profile,
            base_url: self.profile.base_url(),
            poll: self.poll,
            catalog: None,
            schema: None,
        })
    }

    fn setup_statements(&self) -> Vec<SetupStatement> {
        let mut setup = Vec::new();
        if let Some(catalog) = &self.profile.catalog {
            setup.push(SetupStatement::UseCatalog(catalog.clone()));
        }
        if let Some(schema) = &self.profile.schema {
            setup.push(SetupStatement::UseSchema(schema.clone()));
        }
        setup
    }
}

#[async_trait]
impl Backend for DatabricksBackend {
    fn platform(&self) -> Platform {
        Platform::Databricks
    }

    async fn dispatch_test(&self, source: &TestSource) -> DbResult<ExecutionOutcome> {
        let sql = read_sql(&source.path).await?;
        let mut session = self.open()?;
        dispatch_on(&mut session, &self.setup_statements(), sql).await
    }

    async fn fetch_failure_sample(&self, sql: &str, limit: usize) -> DbResult<FailureSample> {
        let mut session = self.open()?;
        apply_setup(&mut session, &self.setup_statements()).await;
        sample_rows(&mut session, sql, limit).await
    }
}

/// Statement context for one dispatch call
pub struct DatabricksSession<'a> {
    client: Client,
    profile: &'a DatabricksProfile,
    base_url: String,
    poll: PollSettings,
    catalog: Option<String>,
    schema: Option<String>,
}

impl<'a> DatabricksSession<'a> {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.profile.access_token)
            .header(ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> DbResult<(StatusCode, String)> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    async fn submit(&self, sql: &str, limit: Option<usize>) -> DbResult<StatementResponse> {
        let body = ExecuteRequest {
            statement: sql,
            warehouse_id: &self.profile.warehouse_id,
            catalog: self.catalog.as_deref(),
            schema: self.schema.as_deref(),
            wait_timeout: WAIT_TIMEOUT,
            on_wait_timeout: "CONTINUE",
            format: "JSON_ARRAY",
            disposition: "INLINE",
            row_limit: limit,
        };
        let (status, text) = self
            .send(self.request(Method::POST, STATEMENTS_PATH).json(&body))
            .await?;
        parse_response(status, &text)
    }

    async fn status(&self, statement_id: &str) -> DbResult<PollState<StatementResponse>> {
        let (status, text) = self
            .send(self.request(Method::GET, &format!("{}/{}", STATEMENTS_PATH, statement_id)))
            .await?;
        let response = parse_response(status, &text)?;
        statement_state(response)
    }

    async fn chunk(&self, link: &str) -> DbResult<ResultData> {
        let (status, text) = self.send(self.request(Method::GET, link)).await?;
        if !status.is_success() {
            return Err(http_error(status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| DbError::PollError(format!("Malformed Databricks result chunk: {}", e)))
    }

    async fn cancel(&self, statement_id: &str) {
        let request = self.request(
            Method::POST,
            &format!("{}/{}/cancel", STATEMENTS_PATH, statement_id),
        );
        match request.send().await {
            Ok(r) if r.status().is_success() => {
                debug!("Cancelled Databricks statement {}", statement_id)
            }
            Ok(r) => warn!(
                "Cancel of Databricks statement {} returned {}",
                statement_id,
                r.status()
            ),
            Err(e) => warn!("Cancel of Databricks statement {} failed: {}", statement_id, e),
        }
    }

    /// Submit and wait for a terminal state
    async fn execute(&self, sql: &str, limit: Option<usize>) -> DbResult<StatementResponse> {
        let submitted = self.submit(sql, limit).await?;
        let statement_id = submitted.statement_id.clone().unwrap_or_default();
        let first = statement_state(submitted)?;
        let result = match first {
            PollState::Done(done) => Ok(done),
            PollState::Running => {
                debug!("Databricks statement {} still running, polling", statement_id);
                poll_until_done(&self.poll, || self.status(&statement_id)).await
            }
        };
        if let Err(DbError::Timeout(_)) = &result {
            self.cancel(&statement_id).await;
        }
        result
    }
}

#[async_trait]
impl<'a> Session for DatabricksSession<'a> {
    async fn apply(&mut self, statement: &SetupStatement) -> DbResult<()> {
        match statement {
            SetupStatement::UseCatalog(catalog) => {
                self.execute(&statement.sql(), None).await?;
                self.catalog = Some(catalog.clone());
                Ok(())
            }
            SetupStatement::UseSchema(schema) => {
                self.execute(&statement.sql(), None).await?;
                self.schema = Some(schema.clone());
                Ok(())
            }
            SetupStatement::SearchPath(_) => Err(DbError::ExecutionError(format!(
                "Setup statement '{}' is not supported on Databricks",
                statement.sql()
            ))),
        }
    }

    async fn query(&mut self, sql: &str, limit: Option<usize>) -> DbResult<RowSet> {
        let response = self.execute(sql, limit).await?;
        let columns: Vec<ColumnInfo> = response
            .manifest
            .and_then(|m| m.schema)
            .map(|s| s.columns)
            .unwrap_or_default();

        let limit = limit.unwrap_or(usize::MAX);
        let mut raw = Vec::new();
        let mut next = match response.result {
            Some(result) => {
                raw.extend(result.data_array);
                result.next_chunk_internal_link
            }
            None => None,
        };
        while raw.len() < limit {
            let Some(link) = next.take() else { break };
            let chunk = self.chunk(&link).await?;
            raw.extend(chunk.data_array);
            next = chunk.next_chunk_internal_link;
        }
        raw.truncate(limit);
        Ok(to_row_set(&columns, raw))
    }
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    statement: &'a str,
    warehouse_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    wait_timeout: &'static str,
    on_wait_timeout: &'static str,
    format: &'static str,
    disposition: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    statement_id: Option<String>,
    #[serde(default)]
    status: Option<StatementStatus>,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: String,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ServiceError {
    fn describe(&self) -> String {
        match (&self.error_code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    schema: Option<ManifestSchema>,
}

#[derive(Debug, Deserialize)]
struct ManifestSchema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
    #[serde(default)]
    type_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<Option<String>>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}

fn http_error(status: StatusCode, text: &str) -> DbError {
    let message = serde_json::from_str::<ServiceError>(text)
        .map(|e| e.describe())
        .unwrap_or_else(|_| text.trim().to_string());
    match status.as_u16() {
        401 | 403 => DbError::ConnectionError(format!(
            "Databricks rejected the access token ({}): {}",
            status, message
        )),
        404 => DbError::ConnectionError(format!(
            "Databricks endpoint or warehouse not found ({}): {}",
            status, message
        )),
        _ => DbError::PollError(format!(
            "Unexpected Databricks response {}: {}",
            status, message
        )),
    }
}

fn parse_response(status: StatusCode, text: &str) -> DbResult<StatementResponse> {
    if !status.is_success() {
        return Err(http_error(status, text));
    }
    serde_json::from_str(text)
        .map_err(|e| DbError::PollError(format!("Malformed Databricks response: {}", e)))
}

/// Classify a statement response by its `status.state`
fn statement_state(response: StatementResponse) -> DbResult<PollState<StatementResponse>> {
    let state = match &response.status {
        Some(status) => status.state.clone(),
        None => return Err(DbError::PollError("Response carried no statement status".into())),
    };
    match state.as_str() {
        "PENDING" | "RUNNING" => Ok(PollState::Running),
        "SUCCEEDED" => Ok(PollState::Done(response)),
        "FAILED" => Err(DbError::ExecutionError(
            response
                .status
                .and_then(|s| s.error)
                .map(|e| e.describe())
                .unwrap_or_else(|| "Statement failed".to_string()),
        )),
        "CANCELED" => Err(DbError::ExecutionError("Statement was canceled".into())),
        "CLOSED" => Err(DbError::ExecutionError(
            "Statement was closed before its result was read".into(),
        )),
        other => Err(DbError::PollError(format!("Unknown statement state '{}'", other))),
    }
}

fn to_row_set(columns: &[ColumnInfo], raw: Vec<Vec<Option<String>>>) -> RowSet {
    let names = columns.iter().map(|c| c.name.clone()).collect();
    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(i, value)| {
                    let type_name = columns.get(i).and_then(|c| c.type_name.as_deref());
                    convert_value(value, type_name)
                })
                .collect()
        })
        .collect();
    RowSet::new(names, rows)
}

/// Converts a JSON_ARRAY string cell using the manifest's type name.
fn convert_value(raw: Option<String>, type_name: Option<&str>) -> CellValue {
    let Some(raw) = raw else {
        return CellValue::Null;
    };
    match type_name.map(str::to_uppercase).as_deref() {
        Some("BYTE" | "SHORT" | "INT" | "LONG") => {
            raw.parse::<i64>().map(CellValue::Int).unwrap_or(CellValue::Text(raw))
        }
        Some("FLOAT" | "DOUBLE") => {
            raw.parse::<f64>().map(CellValue::Float).unwrap_or(CellValue::Text(raw))
        }
        Some("BOOLEAN") => match raw.as_str() {
            "true" => CellValue::Bool(true),
            "false" => CellValue::Bool(false),
            _ => CellValue::Text(raw),
        },
        _ => CellValue::Text(raw),
    }
}

#[cfg(test)]
#[path = "databricks_test.rs"]
mod tests;
