//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use es_core::config::CONFIG_FILE_NAME;
use es_core::discovery::DEFAULT_SUITE_DIR;
use es_core::Platform;
use std::path::PathBuf;

/// EchoSphere - SQL data-quality tests that pass when they return zero rows
#[derive(Parser, Debug)]
#[command(name = "es")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the es.ini configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Directory holding the *.es.sql test suite
    #[arg(short = 'd', long, global = true, default_value = DEFAULT_SUITE_DIR)]
    pub suite_dir: PathBuf,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the test suite
    Run(RunArgs),

    /// Inspect the test suite
    View(ViewArgs),

    /// Create a suite directory and an es.ini template
    Setup(SetupArgs),
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Environment section of es.ini to run against
    #[arg(short, long, env = "ES_ENV")]
    pub env: Option<String>,

    /// Write a JUnit XML report to this path
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Capture failing rows and write them to this workbook
    #[arg(short = 'x', long)]
    pub export_failures: Option<PathBuf>,

    /// Maximum number of tests running at once (overrides es.ini)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub threads: Option<u64>,

    /// Only run tests in this sub-suite
    #[arg(short, long)]
    pub suite: Option<String>,

    /// Rows captured per failing test with --export-failures
    #[arg(long, default_value_t = es_test::DEFAULT_SAMPLE_LIMIT)]
    pub sample_limit: usize,
}

/// Arguments for the view command
#[derive(Args, Debug)]
pub struct ViewArgs {
    #[command(subcommand)]
    pub command: ViewCommands,
}

/// View subcommands
#[derive(Subcommand, Debug)]
pub enum ViewCommands {
    /// List the tests in the suite
    Tests(ViewTestsArgs),

    /// Print the SQL of one test
    Test(ViewTestArgs),
}

/// Arguments for `view tests`
#[derive(Args, Debug)]
pub struct ViewTestsArgs {
    /// Show every test regardless of sub-suite
    #[arg(short, long, conflicts_with = "suite")]
    pub all: bool,

    /// Only show tests in this sub-suite
    #[arg(short, long)]
    pub suite: Option<String>,
}

/// Arguments for `view test`
#[derive(Args, Debug)]
pub struct ViewTestArgs {
    /// Test name, optionally prefixed with its sub-suite (`suite/name`)
    pub name: String,
}

/// Arguments for the setup command
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Platform the es.ini template is written for
    #[arg(value_enum)]
    pub platform: SetupPlatform,

    /// Suite directory to create (defaults to --suite-dir)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

/// Platforms `es setup` can scaffold
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPlatform {
    Snowflake,
    Postgres,
    Databricks,
}

impl From<SetupPlatform> for Platform {
    fn from(platform: SetupPlatform) -> Self {
        match platform {
            SetupPlatform::Snowflake => Platform::Snowflake,
            SetupPlatform::Postgres => Platform::Postgres,
            SetupPlatform::Databricks => Platform::Databricks,
        }
    }
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
