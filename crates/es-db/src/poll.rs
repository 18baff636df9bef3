//! Status polling for asynchronous statement APIs

use crate::error::{DbError, DbResult};
use es_core::config::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_QUERY_TIMEOUT_SECS};
use es_core::RunSettings;
use std::future::Future;
use std::time::{Duration, Instant};

/// How often to poll and how long to wait overall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Some(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)),
        }
    }
}

impl From<&RunSettings> for PollSettings {
    fn from(settings: &RunSettings) -> Self {
        Self {
            interval: settings.poll_interval,
            timeout: settings.query_timeout,
        }
    }
}

/// Result of a single status check
#[derive(Debug)]
pub enum PollState<T> {
    Running,
    Done(T),
}

/// Call `check` until it reports `Done`, sleeping `interval` between calls.
///
/// Errors from `check` end polling immediately. Exceeding the timeout yields
/// `DbError::Timeout`; the caller is responsible for cancelling remote work.
pub async fn poll_until_done<T, F, Fut>(settings: &PollSettings, mut check: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<PollState<T>>>,
{
    let started = Instant::now();
    loop {
        if let PollState::Done(value) = check().await? {
            return Ok(value);
        }
        if let Some(limit) = settings.timeout {
            if started.elapsed() >= limit {
                return Err(DbError::Timeout(limit));
            }
        }
        tokio::time::sleep(settings.interval).await;
    }
}

/// Bound a future by an optional timeout
pub async fn with_timeout<T, Fut>(timeout: Option<Duration>, fut: Fut) -> DbResult<T>
where
    Fut: Future<Output = DbResult<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| DbError::Timeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod tests;
