//! Test execution

use crate::result::{RunReport, TestError, TestOutcome, TestResult};
use es_core::config::DEFAULT_THREADS;
use es_core::TestSource;
use es_db::session::round_secs;
use es_db::{Backend, DbError, FailureSample};
use futures::FutureExt;
use log::{debug, warn};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Maximum number of failing rows captured per test
pub const DEFAULT_SAMPLE_LIMIT: usize = 1000;

/// Options controlling a test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound on concurrently running tests
    pub threads: usize,

    /// Fetch a sample of offending rows for failed tests
    pub capture_failure_data: bool,

    /// Rows to keep per failure sample
    pub sample_limit: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            capture_failure_data: false,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

/// Runs SQL tests concurrently against one backend
pub struct TestRunner {
    backend: Arc<dyn Backend>,
    options: RunOptions,
}

impl TestRunner {
    /// Create a new test runner
    pub fn new(backend: Arc<dyn Backend>, options: RunOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every test and collect the outcomes
    pub async fn run(&self, sources: Vec<TestSource>) -> RunReport {
        self.run_with(sources, |_| {}).await
    }

    /// Run every test, calling `on_complete` for each outcome as it arrives.
    ///
    /// `min(threads, sources.len())` workers drain a shared queue and send
    /// outcomes to this task, which is the only writer of the report.
    /// Outcomes are recorded in completion order. A failing or panicking
    /// test never stops its siblings, and nothing is retried.
    pub async fn run_with<F>(&self, sources: Vec<TestSource>, mut on_complete: F) -> RunReport
    where
        F: FnMut(&TestOutcome),
    {
        let start = Instant::now();
        let mut report = RunReport::default();
        if sources.is_empty() {
            return report;
        }

        let width = self.options.threads.max(1).min(sources.len());
        debug!("Running {} tests on {} workers", sources.len(), width);

        let queue = Arc::new(Mutex::new(VecDeque::from(sources)));
        let (tx, mut rx) = mpsc::unbounded_channel::<TestOutcome>();
        let mut workers = JoinSet::new();

        for _ in 0..width {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let backend = Arc::clone(&self.backend);
            let options = self.options.clone();

            workers.spawn(async move {
                loop {
                    let next = queue.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
                    let Some(source) = next else {
                        break;
                    };
                    let outcome = execute_test(backend.as_ref(), &source, &options).await;
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        // The channel closes once every worker has dropped its sender.
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            on_complete(&outcome);
            match outcome {
                TestOutcome::Completed(result) => report.results.push(result),
                TestOutcome::Errored(error) => report.errors.push(error),
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Worker task join error: {}", e);
            }
        }

        report.elapsed_secs = round_secs(start.elapsed());
        report
    }
}

/// Dispatch one test and, if it failed, optionally capture its rows
async fn execute_test(backend: &dyn Backend, source: &TestSource, options: &RunOptions) -> TestOutcome {
    let dispatched = AssertUnwindSafe(backend.dispatch_test(source))
        .catch_unwind()
        .await;

    let outcome = match dispatched {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            debug!("Test '{}' errored: {}", source.name, e);
            return TestOutcome::Errored(TestError::new(&source.name, e));
        }
        Err(panic) => {
            let message = format!("Test task panicked: {}", panic_message(panic.as_ref()));
            warn!("Test '{}': {}", source.name, message);
            return TestOutcome::Errored(TestError::new(
                &source.name,
                DbError::Internal(message),
            ));
        }
    };

    let mut result = TestResult::from_outcome(&source.name, outcome);
    if !result.passed && options.capture_failure_data {
        result.failure_sample =
            capture_sample(backend, &source.name, &result.sql, options.sample_limit).await;
    }
    TestOutcome::Completed(result)
}

/// Best-effort sample fetch; failures are logged and absorbed
async fn capture_sample(
    backend: &dyn Backend,
    name: &str,
    sql: &str,
    limit: usize,
) -> Option<FailureSample> {
    match AssertUnwindSafe(backend.fetch_failure_sample(sql, limit))
        .catch_unwind()
        .await
    {
        Ok(Ok(sample)) => Some(sample),
        Ok(Err(e)) => {
            warn!("Could not capture failing rows for '{}': {}", name, e);
            None
        }
        Err(panic) => {
            warn!(
                "Capturing failing rows for '{}' panicked: {}",
                name,
                panic_message(panic.as_ref())
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
