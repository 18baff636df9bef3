//! es-test - Test orchestration for EchoSphere
//!
//! This crate runs discovered SQL tests through a bounded worker pool,
//! aggregates their outcomes into a `RunReport`, and renders the report as
//! JUnit XML or as a workbook of failing-row samples.

pub mod error;
pub mod excel;
pub mod junit;
pub mod result;
pub mod runner;

mod output;

pub use error::{ExportError, ExportResult};
pub use excel::{sanitize_sheet_name, write_failure_workbook};
pub use junit::{render_junit, write_junit};
pub use result::{RunReport, RunVerdict, TestError, TestOutcome, TestResult};
pub use runner::{RunOptions, TestRunner, DEFAULT_SAMPLE_LIMIT};
