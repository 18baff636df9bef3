//! es-core - Core library for EchoSphere
//!
//! This crate provides the shared types used across all EchoSphere
//! components: `es.ini` resolution into connection profiles, test suite
//! discovery, and the SQL wrapping helpers used by every backend.

pub mod config;
pub mod discovery;
pub mod error;
pub mod sql_utils;

pub use config::{
    ConnectionProfile, DatabricksProfile, EnvConfig, EsConfig, Platform, PostgresProfile,
    RunSettings, SnowflakeProfile,
};
pub use discovery::{discover_tests, find_test, TestSource};
pub use error::{CoreError, CoreResult};
