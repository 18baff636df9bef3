//! es-db - Warehouse dispatch layer for EchoSphere
//!
//! This crate provides the `Backend` trait and one implementation per
//! supported platform. Every implementation opens its own connection per
//! call, runs the optional environment setup, and executes a wrapped
//! version of the test query.

pub mod databricks;
pub mod error;
pub mod poll;
pub mod postgres;
pub mod sample;
pub mod session;
pub mod snowflake;
pub mod traits;

use es_core::ConnectionProfile;
use std::sync::Arc;

pub use databricks::DatabricksBackend;
pub use error::{DbError, DbResult, ErrorCategory};
pub use poll::PollSettings;
pub use postgres::PostgresBackend;
pub use sample::{CellValue, FailureSample, RowSet};
pub use snowflake::SnowflakeBackend;
pub use traits::{Backend, ExecutionOutcome, Session, SetupStatement};

/// Application name reported to every warehouse
pub(crate) const APPLICATION_NAME: &str = "EchoSphere";

/// Query tag attached to statements on platforms that support one
pub(crate) const QUERY_TAG: &str = "EchoSphere Testing Suite Run";

/// Build the backend for a resolved connection profile
pub fn backend_for(profile: &ConnectionProfile, poll: PollSettings) -> Arc<dyn Backend> {
    match profile {
        ConnectionProfile::Snowflake(p) => Arc::new(SnowflakeBackend::new(p.clone(), poll)),
        ConnectionProfile::Postgres(p) => Arc::new(PostgresBackend::new(p.clone(), poll)),
        ConnectionProfile::Databricks(p) => Arc::new(DatabricksBackend::new(p.clone(), poll)),
    }
}
