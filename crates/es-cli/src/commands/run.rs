//! Run command implementation

use anyhow::{Context, Result};
use es_core::{EnvConfig, EsConfig};
use es_db::PollSettings;
use es_test::{RunOptions, RunReport, RunVerdict, TestOutcome, TestRunner};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use super::common::{self, FAILURE_EXIT_CODE, NO_TESTS_MESSAGE};
use crate::cli::{GlobalArgs, RunArgs};

/// Execute the run command
pub(crate) async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let start = Instant::now();

    let sources = common::discover(&global.suite_dir, args.suite.as_deref())?;
    common::print_banner("Test Suite");
    if sources.is_empty() {
        println!("{}", NO_TESTS_MESSAGE);
        std::process::exit(FAILURE_EXIT_CODE);
    }
    common::print_test_table(&sources);

    let env = load_environment(args, global)?;
    let options = run_options(args, &env);
    common::print_banner(&format!(
        "Running {} tests against '{}' ({}) on {} workers",
        sources.len(),
        env.name,
        env.platform(),
        options.threads.min(sources.len())
    ));

    let backend = es_db::backend_for(&env.profile, PollSettings::from(&env.settings));
    let runner = TestRunner::new(backend, options);

    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let report = runner
        .run_with(sources, |outcome| {
            pb.suspend(|| println!("{}", outcome_line(outcome)));
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    print_summary(&report, global.verbose);
    write_reports(args, &report);

    let verdict = report.verdict();
    common::print_banner(&verdict_line(verdict, start.elapsed().as_secs_f64()));
    if !verdict.is_success() {
        std::process::exit(FAILURE_EXIT_CODE);
    }

    Ok(())
}

fn load_environment(args: &RunArgs, global: &GlobalArgs) -> Result<EnvConfig> {
    let config = EsConfig::load(&global.config)
        .with_context(|| format!("Failed to load {}", global.config.display()))?;
    let env = config
        .resolve(args.env.as_deref())
        .context("Failed to resolve environment")?;
    log::info!(
        "Using environment '{}' ({}) from {}",
        env.name,
        env.platform(),
        config.path().display()
    );
    Ok(env)
}

/// Runner options from the resolved settings and command-line overrides
fn run_options(args: &RunArgs, env: &EnvConfig) -> RunOptions {
    RunOptions {
        threads: args
            .threads
            .map(|t| t as usize)
            .unwrap_or(env.settings.threads),
        capture_failure_data: args.export_failures.is_some(),
        sample_limit: args.sample_limit,
    }
}

/// One progress line per completed test
fn outcome_line(outcome: &TestOutcome) -> String {
    match outcome {
        TestOutcome::Completed(result) if result.passed => {
            format!("  ✓ {} [{}ms]", result.name, millis(result.duration_secs))
        }
        TestOutcome::Completed(result) => format!(
            "  ✗ {} ({} rows) [{}ms]",
            result.name,
            result.row_count,
            millis(result.duration_secs)
        ),
        TestOutcome::Errored(error) => format!("  ✗ {} - {}", error.name, error.error),
    }
}

fn millis(secs: f64) -> u64 {
    (secs * 1000.0).round() as u64
}

fn print_summary(report: &RunReport, verbose: bool) {
    println!();
    if report.failed_count() > 0 {
        println!("Failed tests:");
        for result in report.failures() {
            println!(
                "  {}: {}",
                result.name,
                result.failure_message.as_deref().unwrap_or("Test failed")
            );
            if verbose {
                for line in result.sql.lines() {
                    println!("      {}", line);
                }
            }
        }
        println!();
    }
    if report.error_count() > 0 {
        println!("Errored tests:");
        for error in &report.errors {
            println!("  {} ({}): {}", error.name, error.error.category(), error.error);
        }
        println!();
    }
    println!(
        "Passed: {}, Failed: {}, Errors: {}",
        report.passed_count(),
        report.failed_count(),
        report.error_count()
    );
}

/// Export failures are reported but never change the run's exit status
fn write_reports(args: &RunArgs, report: &RunReport) {
    if let Some(path) = &args.junit {
        match es_test::write_junit(report, path) {
            Ok(written) => println!("JUnit report written to {}", written.display()),
            Err(e) => {
                log::error!("JUnit export failed: {}", e);
                eprintln!("Failed to write JUnit report: {}", e);
            }
        }
    }

    if let Some(path) = &args.export_failures {
        match es_test::write_failure_workbook(report, path, args.sample_limit) {
            Ok(written) => println!("Failure samples written to {}", written.display()),
            Err(e) => {
                log::error!("Failure export failed: {}", e);
                eprintln!("Failed to write failure workbook: {}", e);
            }
        }
    }
}

fn verdict_line(verdict: RunVerdict, elapsed_secs: f64) -> String {
    match verdict {
        RunVerdict::Passed => format!("Test Run Successful. {:.3}s", elapsed_secs),
        RunVerdict::Failed => format!("Test Run Failed. {:.3}s", elapsed_secs),
        RunVerdict::NoTests => "No Tests Executed.".to_string(),
    }
}

#[cfg(test)]
#[path = "run_test.rs"]
mod tests;
