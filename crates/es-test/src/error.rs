//! Error types for report exports

use thiserror::Error;

/// Errors raised while writing a report file
#[derive(Error, Debug)]
pub enum ExportError {
    /// Output directory could not be created (X001)
    #[error("[X001] Failed to create directories for '{path}': {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    /// Report file could not be written (X002)
    #[error("[X002] Failed to write report to '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    /// Workbook could not be built or saved (X003)
    #[error("[X003] Failed to write workbook to '{path}': {source}")]
    Workbook {
        path: String,
        source: rust_xlsxwriter::XlsxError,
    },

    /// Output path could not be resolved (X004)
    #[error("[X004] Failed to resolve output path: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ExportError
pub type ExportResult<T> = Result<T, ExportError>;
