//! Generic long-poll primitive for asynchronous remote jobs
//!
//! Remote scans run for minutes. A fixed-interval poll avoids both
//! busy-waiting and excessive remote load, and the wall-clock timeout
//! keeps a run from hanging on a stuck job. Which status values are
//! terminal is the caller's decision, not this module's.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Remote job state as observed through status queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Source of job status responses, queried once per poll iteration.
/// The response is a JSON object carrying a `status` field.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<Value>;
}

/// Polling behavior supplied by the caller
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Fixed sleep between consecutive status queries
    pub interval: Duration,
    /// Wall-clock budget measured from the first query
    pub timeout: Duration,
    /// Status values meaning the job finished successfully
    pub success_states: Vec<String>,
    /// Status values meaning the job terminally failed
    pub error_states: Vec<String>,
    /// Transient query failures are retried this many times with
    /// exponential backoff before the error is escalated
    pub query_retries: usize,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            success_states: vec!["completed".into(), "finished".into(), "done".into()],
            error_states: vec!["failed".into(), "error".into()],
            query_retries: 3,
        }
    }

    pub fn with_success_states(mut self, states: &[&str]) -> Self {
        self.success_states = states.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_error_states(mut self, states: &[&str]) -> Self {
        self.error_states = states.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_query_retries(mut self, retries: usize) -> Self {
        self.query_retries = retries;
        self
    }
}

/// Synchronization primitive shared by every executor that wraps a
/// remote asynchronous job
pub struct PollingCoordinator {
    config: PollConfig,
}

impl PollingCoordinator {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Classify a status value against the configured terminal sets
    pub fn classify(&self, status: &str) -> JobState {
        if self.config.success_states.iter().any(|s| s == status) {
            JobState::Completed
        } else if self.config.error_states.iter().any(|s| s == status) {
            JobState::Failed
        } else if status == "pending" {
            JobState::Pending
        } else {
            JobState::Running
        }
    }

    /// Query until a terminal state or until the timeout elapses.
    /// Returns the full response on success; fails with `JobFailed` on
    /// a terminal error status and `PollTimeout` when the budget runs
    /// out, carrying the last observed status.
    pub async fn wait_until_terminal<S>(&self, source: &S) -> Result<Value>
    where
        S: JobStatusSource + ?Sized,
    {
        let started = Instant::now();
        let mut last_status = String::from("unknown");

        loop {
            if started.elapsed() >= self.config.timeout {
                return Err(Error::PollTimeout {
                    waited_secs: started.elapsed().as_secs(),
                    last_status,
                });
            }

            let response = self.query_with_retry(source).await?;
            let status = response
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();

            match self.classify(&status) {
                JobState::Completed => {
                    debug!(%status, "job reached terminal success state");
                    return Ok(response);
                }
                JobState::Failed => {
                    return Err(Error::JobFailed {
                        status,
                        response: response.to_string(),
                    });
                }
                state => {
                    debug!(%status, ?state, "job still in progress");
                }
            }

            last_status = status;
            sleep(self.config.interval).await;
        }
    }

    /// One status query, retried with backoff on transient failures
    async fn query_with_retry<S>(&self, source: &S) -> Result<Value>
    where
        S: JobStatusSource + ?Sized,
    {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30))
            .with_max_times(self.config.query_retries)
            .with_jitter();

        (|| source.fetch_status())
            .retry(backoff)
            .notify(|err, delay| {
                warn!(%err, ?delay, "status query failed, retrying");
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a scripted sequence of responses; repeats the final one
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Value>>>,
        queries: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Value>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                queries: AtomicUsize::new(0),
            }
        }

        fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobStatusSource for ScriptedSource {
        async fn fetch_status(&self) -> Result<Value> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            match responses.pop_front() {
                Some(response) => response,
                None => Ok(json!({"status": "running"})),
            }
        }
    }

    fn status(s: &str) -> Result<Value> {
        Ok(json!({"status": s, "scan_id": "scan-1"}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_on_success_after_two_waits() {
        let source = ScriptedSource::new(vec![
            status("running"),
            status("running"),
            status("completed"),
        ]);
        let config = PollConfig::new(Duration::from_secs(15), Duration::from_secs(600))
            .with_success_states(&["completed"]);
        let coordinator = PollingCoordinator::new(config);

        let started = Instant::now();
        let response = coordinator.wait_until_terminal(&source).await.unwrap();

        assert_eq!(response["status"], "completed");
        assert_eq!(response["scan_id"], "scan-1");
        assert_eq!(source.query_count(), 3);
        // Exactly two inter-query waits with the paused clock
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_fails_with_response() {
        let source = ScriptedSource::new(vec![status("running"), status("cancelled")]);
        let config = PollConfig::new(Duration::from_secs(5), Duration::from_secs(600))
            .with_success_states(&["completed"])
            .with_error_states(&["failed", "error", "cancelled"]);
        let coordinator = PollingCoordinator::new(config);

        let err = coordinator.wait_until_terminal(&source).await.unwrap_err();
        match err {
            Error::JobFailed { status, response } => {
                assert_eq!(status, "cancelled");
                assert!(response.contains("scan-1"));
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_last_status() {
        // Never reaches a terminal state
        let source = ScriptedSource::new(vec![]);
        let config = PollConfig::new(Duration::from_secs(10), Duration::from_secs(35))
            .with_success_states(&["completed"]);
        let coordinator = PollingCoordinator::new(config);

        let err = coordinator.wait_until_terminal(&source).await.unwrap_err();
        match err {
            Error::PollTimeout {
                waited_secs,
                last_status,
            } => {
                assert!(waited_secs >= 35);
                assert_eq!(last_status, "running");
            }
            other => panic!("expected PollTimeout, got {other:?}"),
        }
        // Queries at t=0, 10, 20, 30; the t=40 check trips the budget
        assert_eq!(source.query_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_query_error_is_retried() {
        let source = ScriptedSource::new(vec![
            Err(Error::Config("connection reset".into())),
            status("completed"),
        ]);
        let config = PollConfig::new(Duration::from_secs(5), Duration::from_secs(600))
            .with_success_states(&["completed"])
            .with_query_retries(2);
        let coordinator = PollingCoordinator::new(config);

        let response = coordinator.wait_until_terminal(&source).await.unwrap();
        assert_eq!(response["status"], "completed");
        assert_eq!(source.query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_query_error_escalates() {
        let source = ScriptedSource::new(vec![
            Err(Error::Config("connection refused".into())),
            Err(Error::Config("connection refused".into())),
            Err(Error::Config("connection refused".into())),
        ]);
        let config = PollConfig::new(Duration::from_secs(5), Duration::from_secs(600))
            .with_success_states(&["completed"])
            .with_query_retries(2);
        let coordinator = PollingCoordinator::new(config);

        let err = coordinator.wait_until_terminal(&source).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(source.query_count(), 3);
    }

    #[test]
    fn test_classify() {
        let config = PollConfig::new(Duration::from_secs(1), Duration::from_secs(10))
            .with_success_states(&["completed"])
            .with_error_states(&["failed"]);
        let coordinator = PollingCoordinator::new(config);
        assert_eq!(coordinator.classify("completed"), JobState::Completed);
        assert_eq!(coordinator.classify("failed"), JobState::Failed);
        assert_eq!(coordinator.classify("pending"), JobState::Pending);
        assert_eq!(coordinator.classify("scanning"), JobState::Running);
    }
}
