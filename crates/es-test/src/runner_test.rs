use super::*;
use async_trait::async_trait;
use es_core::Platform;
use es_db::{CellValue, DbResult, ExecutionOutcome, RowSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Backend whose row counts are scripted by test name
#[derive(Default)]
struct FakeBackend {
    counts: HashMap<String, u64>,
    errors: HashMap<String, String>,
    panics: Vec<String>,
    fail_samples: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    dispatched: Mutex<HashMap<String, usize>>,
    samples_requested: AtomicUsize,
}

#[async_trait]
impl Backend for FakeBackend {
    fn platform(&self) -> Platform {
        Platform::Postgres
    }

    async fn dispatch_test(&self, source: &TestSource) -> DbResult<ExecutionOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        *self
            .dispatched
            .lock()
            .unwrap()
            .entry(source.name.clone())
            .or_default() += 1;

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.contains(&source.name) {
            panic!("driver exploded on {}", source.name);
        }
        if let Some(message) = self.errors.get(&source.name) {
            return Err(DbError::ConnectionError(message.clone()));
        }
        Ok(ExecutionOutcome {
            row_count: self.counts.get(&source.name).copied().unwrap_or(0),
            elapsed_secs: 0.01,
            sql: format!("SELECT * FROM {};", source.name),
        })
    }

    async fn fetch_failure_sample(&self, _sql: &str, limit: usize) -> DbResult<FailureSample> {
        self.samples_requested.fetch_add(1, Ordering::SeqCst);
        if self.fail_samples {
            return Err(DbError::ExecutionError("sample query rejected".into()));
        }
        let rows = (0..limit.min(3) as i64)
            .map(|i| vec![CellValue::Int(i)])
            .collect();
        Ok(RowSet::new(vec!["id".into()], rows))
    }
}

fn sources(names: &[&str]) -> Vec<TestSource> {
    names
        .iter()
        .map(|n| TestSource::new(n, format!("/suite/{}.es.sql", n), None))
        .collect()
}

fn runner(backend: FakeBackend, options: RunOptions) -> (Arc<FakeBackend>, TestRunner) {
    let backend = Arc::new(backend);
    let runner = TestRunner::new(backend.clone(), options);
    (backend, runner)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_more_tests_than_workers_run_exactly_once() {
    let names: Vec<String> = (0..25).map(|i| format!("check_{:02}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (backend, runner) = runner(
        FakeBackend {
            delay: Duration::from_millis(10),
            ..Default::default()
        },
        RunOptions {
            threads: 4,
            ..Default::default()
        },
    );

    let report = runner.run(sources(&refs)).await;

    assert_eq!(report.results.len(), 25);
    assert!(report.errors.is_empty());
    let dispatched = backend.dispatched.lock().unwrap();
    assert_eq!(dispatched.len(), 25);
    assert!(dispatched.values().all(|n| *n == 1));
    let peak = backend.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak concurrency {peak} exceeded the pool width");
}

#[tokio::test]
async fn test_pass_and_fail_scenarios() {
    let (_, runner) = runner(
        FakeBackend {
            counts: HashMap::from([("bad_rows".to_string(), 5)]),
            ..Default::default()
        },
        RunOptions::default(),
    );

    let report = runner.run(sources(&["clean", "bad_rows"])).await;
    let by_name: HashMap<_, _> = report.results.iter().map(|r| (r.name.as_str(), r)).collect();

    let clean = by_name["clean"];
    assert!(clean.passed);
    assert_eq!(clean.failure_message, None);

    let bad = by_name["bad_rows"];
    assert!(!bad.passed);
    assert_eq!(
        bad.failure_message.as_deref(),
        Some("Test returned 5 rows. Expected 0 rows.")
    );
    assert_eq!(report.verdict(), crate::RunVerdict::Failed);
}

#[tokio::test]
async fn test_samples_only_fetched_for_failures_when_requested() {
    let (backend, runner) = runner(
        FakeBackend {
            counts: HashMap::from([("bad".to_string(), 2)]),
            ..Default::default()
        },
        RunOptions {
            capture_failure_data: true,
            sample_limit: 2,
            ..Default::default()
        },
    );

    let report = runner.run(sources(&["good", "bad"])).await;
    assert_eq!(backend.samples_requested.load(Ordering::SeqCst), 1);

    let bad = report.failures().next().unwrap();
    let sample = bad.failure_sample.as_ref().unwrap();
    assert_eq!(sample.columns, vec!["id".to_string()]);
    assert_eq!(sample.rows.len(), 2);
}

#[tokio::test]
async fn test_samples_not_fetched_without_capture() {
    let (backend, runner) = runner(
        FakeBackend {
            counts: HashMap::from([("bad".to_string(), 2)]),
            ..Default::default()
        },
        RunOptions::default(),
    );

    let report = runner.run(sources(&["bad"])).await;
    assert_eq!(backend.samples_requested.load(Ordering::SeqCst), 0);
    assert!(report.results[0].failure_sample.is_none());
}

#[tokio::test]
async fn test_sample_error_is_absorbed() {
    let (_, runner) = runner(
        FakeBackend {
            counts: HashMap::from([("bad".to_string(), 9)]),
            fail_samples: true,
            ..Default::default()
        },
        RunOptions {
            capture_failure_data: true,
            ..Default::default()
        },
    );

    let report = runner.run(sources(&["bad"])).await;
    assert_eq!(report.results.len(), 1);
    assert!(report.errors.is_empty());
    assert_eq!(report.results[0].row_count, 9);
    assert!(report.results[0].failure_sample.is_none());
}

#[tokio::test]
async fn test_dispatch_error_and_panic_become_test_errors() {
    let (_, runner) = runner(
        FakeBackend {
            errors: HashMap::from([("unreachable".to_string(), "refused".to_string())]),
            panics: vec!["boom".to_string()],
            ..Default::default()
        },
        RunOptions {
            threads: 2,
            ..Default::default()
        },
    );

    let report = runner.run(sources(&["ok", "unreachable", "boom", "ok_too"])).await;

    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.passed));
    assert_eq!(report.errors.len(), 2);

    let errors: HashMap<_, _> = report.errors.iter().map(|e| (e.name.as_str(), e)).collect();
    assert!(matches!(errors["unreachable"].error, DbError::ConnectionError(_)));
    match &errors["boom"].error {
        DbError::Internal(message) => assert!(message.contains("driver exploded on boom")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(report.verdict(), crate::RunVerdict::Failed);
}

#[tokio::test]
async fn test_no_sources_is_no_tests() {
    let (backend, runner) = runner(FakeBackend::default(), RunOptions::default());
    let report = runner.run(Vec::new()).await;
    assert_eq!(report.verdict(), crate::RunVerdict::NoTests);
    assert!(backend.dispatched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_on_complete_sees_every_outcome() {
    let (_, runner) = runner(
        FakeBackend {
            errors: HashMap::from([("b".to_string(), "down".to_string())]),
            ..Default::default()
        },
        RunOptions {
            threads: 1,
            ..Default::default()
        },
    );

    let mut seen = Vec::new();
    let report = runner
        .run_with(sources(&["a", "b", "c"]), |outcome| {
            seen.push(outcome.name().to_string())
        })
        .await;

    seen.sort();
    assert_eq!(seen, vec!["a", "b", "c"]);
    assert_eq!(report.total(), 3);
}

#[test]
fn test_panic_message() {
    let payload: Box<dyn Any + Send> = Box::new("static str");
    assert_eq!(panic_message(payload.as_ref()), "static str");
    let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
    assert_eq!(panic_message(payload.as_ref()), "owned");
    let payload: Box<dyn Any + Send> = Box::new(42_u8);
    assert_eq!(panic_message(payload.as_ref()), "unknown panic");
}
