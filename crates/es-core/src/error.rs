//! Error types for es-core

use thiserror::Error;

/// Core error type for EchoSphere
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config {path}: {message}")]
    ConfigParseError { path: String, message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E004: Environment section missing from es.ini
    #[error("[E004] Environment section '{section}' not found in es.ini")]
    SectionNotFound { section: String },

    /// E005: Required key missing from an environment section
    #[error("[E005] Missing required option '{key}' in section [{section}] of es.ini")]
    MissingKey { section: String, key: String },

    /// E006: No environment selected and no default configured
    #[error("[E006] No environment selected. Pass --env, set ES_ENV, or add `env = <section>` under [default]")]
    NoEnvironment,

    /// E007: Unsupported platform name
    #[error("[E007] Unsupported platform '{name}' found in es.ini. Should be one of: [{supported}]")]
    UnsupportedPlatform { name: String, supported: String },

    /// E008: Two test files resolve to the same test name
    #[error("[E008] Duplicate test name '{name}' in {path1} and {path2}")]
    DuplicateTest {
        name: String,
        path1: String,
        path2: String,
    },

    /// E009: Invalid discovery pattern
    #[error("[E009] Invalid test search pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// E010: IO error
    #[error("[E010] IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
