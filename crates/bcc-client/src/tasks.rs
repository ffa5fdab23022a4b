//! Asynchronous task tracking.
//!
//! Mutations may answer with a list of server-side jobs in the `X-Esu-Tasks`
//! header. The waiter polls `v1/job/<id>` for each of them, one after another,
//! until it leaves the in-progress state.

use crate::manager::{pause, Manager};
use crate::Result;
use bcc_core::query::Arguments;
use bcc_core::Error;
use serde::Deserialize;
use std::fmt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Job status reported while a task is still running.
pub const STATUS_IN_PROGRESS: &str = "in-progress";

/// Job status reported when a task failed.
pub const STATUS_ERROR: &str = "error";

/// Ordered task identifiers taken from a response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskIds(Vec<String>);

impl TaskIds {
    /// Parse a comma-separated header value, trimming entries and dropping
    /// empty ones.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        Self(
            header
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Returns true if no tasks were announced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in announcement order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Identifiers as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for TaskIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

/// Job status payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobStatus {
    /// Current status
    #[serde(default)]
    pub status: String,
    /// Current step name
    #[serde(default)]
    pub name: String,
}

impl JobStatus {
    /// Returns true if the job failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == STATUS_ERROR
    }

    /// Returns true while the job is still running.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == STATUS_IN_PROGRESS
    }
}

impl Manager {
    /// Wait for every task in a comma-separated header value.
    ///
    /// # Errors
    ///
    /// See [`Manager::wait_tasks`].
    pub async fn wait_all(&self, cancel: &CancellationToken, header: &str) -> Result<()> {
        self.wait_tasks(cancel, &TaskIds::parse(header)).await
    }

    /// Wait for each task in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the first task that fails, times out or cannot be
    /// polled; later tasks are not waited on.
    pub async fn wait_tasks(&self, cancel: &CancellationToken, tasks: &TaskIds) -> Result<()> {
        for task_id in tasks.iter() {
            self.wait_task(cancel, task_id).await?;
        }
        Ok(())
    }

    /// Poll one task until it leaves the in-progress state.
    ///
    /// Any status other than `error` or `in-progress` counts as success.
    ///
    /// # Errors
    ///
    /// - [`Error::TaskFailed`] as soon as the job reports `error`
    /// - [`Error::Timeout`] once the task deadline has passed
    /// - whatever the status request itself returned, without retrying it
    pub async fn wait_task(&self, cancel: &CancellationToken, task_id: &str) -> Result<()> {
        info!(task_id, "Start waiting task");

        let schedule = self.config().task_schedule();
        let path = format!("v1/job/{task_id}");
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let job: JobStatus = self.get(cancel, &path, &Arguments::new()).await?;
            debug!(task_id, polls, status = %job.status, step = %job.name, "Task status");

            if job.is_failed() {
                return Err(Error::TaskFailed {
                    task_id: task_id.to_string(),
                    step: job.name,
                });
            }

            if !job.is_in_progress() {
                info!(task_id, polls, "End waiting task");
                return Ok(());
            }

            if schedule.is_expired(started.elapsed()) {
                warn!(task_id, "Waiting task took more than {:?}", schedule.timeout);
                return Err(Error::Timeout(format!("Task {task_id} timeout")));
            }

            pause(cancel, schedule.interval).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcc_core::config::{Credentials, ManagerConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_manager(server: &MockServer, task_timeout_secs: u64) -> Manager {
        let config = ManagerConfig::new(server.uri())
            .unwrap()
            .with_task_poll_interval(10)
            .with_task_timeout(task_timeout_secs);
        Manager::builder(Credentials::new("token"))
            .with_config(config)
            .build()
            .unwrap()
    }

    fn job(status: &str, name: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"status": status, "name": name}))
    }

    #[test]
    fn parse_trims_and_skips_empty() {
        let ids = TaskIds::parse(" a, b ,,c , ");
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(ids.to_string(), "a,b,c");
        assert!(TaskIds::parse("").is_empty());
        assert!(TaskIds::parse(" , ,").is_empty());
    }

    #[test]
    fn job_status_classification() {
        let failed = JobStatus {
            status: "error".to_string(),
            name: "step".to_string(),
        };
        assert!(failed.is_failed());
        assert!(!failed.is_in_progress());

        let done = JobStatus {
            status: "done".to_string(),
            name: String::new(),
        };
        assert!(!done.is_failed());
        assert!(!done.is_in_progress());
    }

    #[tokio::test]
    async fn polls_until_task_leaves_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/t1"))
            .respond_with(job("in-progress", "create_vm"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/job/t1"))
            .respond_with(job("success", "create_vm"))
            .mount(&server)
            .await;

        let manager = test_manager(&server, 60);
        manager
            .wait_task(&CancellationToken::new(), "t1")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn error_status_fails_without_more_polls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/t1"))
            .respond_with(job("error", "attach_disk"))
            .expect(1)
            .mount(&server)
            .await;

        let manager = test_manager(&server, 60);
        let err = manager
            .wait_task(&CancellationToken::new(), "t1")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::TaskFailed {
                task_id: "t1".to_string(),
                step: "attach_disk".to_string()
            }
        );
    }

    #[tokio::test]
    async fn status_fetch_failure_ends_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/t1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let manager = test_manager(&server, 60);
        let err = manager
            .wait_task(&CancellationToken::new(), "t1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn task_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/t1"))
            .respond_with(job("in-progress", "build"))
            .mount(&server)
            .await;

        let manager = test_manager(&server, 1);
        let err = manager
            .wait_task(&CancellationToken::new(), "t1")
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn wait_all_stops_at_first_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/a"))
            .respond_with(job("done", "first"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/job/b"))
            .respond_with(job("error", "second"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/job/c"))
            .respond_with(job("done", "third"))
            .expect(0)
            .mount(&server)
            .await;

        let manager = test_manager(&server, 60);
        let err = manager
            .wait_all(&CancellationToken::new(), "a, b, c")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskFailed { ref task_id, .. } if task_id == "b"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/t1"))
            .respond_with(job("in-progress", "build"))
            .mount(&server)
            .await;

        let manager = test_manager(&server, 600);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = manager.wait_task(&cancel, "t1").await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
