//! Protocol constants and polling schedules.
//!
//! This module collects the fixed values of the control-plane protocol (header
//! names, default intervals and deadlines) and the [`PollSchedule`] type used by
//! the task and lock waiters.

use std::time::Duration;

/// Default control-plane base URL
pub const DEFAULT_BASE_URL: &str = "https://cp.iteco.cloud";

/// Response header carrying comma-separated task identifiers
pub const TASKS_HEADER: &str = "X-Esu-Tasks";

/// Response language requested on every call
pub const ACCEPT_LANGUAGE: &str = "ru-ru";

/// Error alias the server uses for a generic object lock
pub const OBJECT_LOCKED_ALIAS: &str = "object_locked";

// Timing defaults

/// Default deadline for the lock-conflict retry loop (in seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 1200;

/// Default pause between lock-conflict retries (in milliseconds)
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 500;

/// Default deadline for a single task to finish (in seconds)
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 600;

/// Default pause between job-status polls (in milliseconds)
pub const DEFAULT_TASK_POLL_INTERVAL_MS: u64 = 500;

/// Default pause between lock-state polls (in milliseconds)
pub const DEFAULT_LOCK_POLL_INTERVAL_MS: u64 = 1000;

// Connection pool settings

/// Default idle timeout for connection pools (in seconds)
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Default maximum idle connections per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Default TCP connect timeout (in seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Fixed-interval polling schedule.
///
/// A schedule with a `timeout` gives up once that much time has elapsed; one
/// without keeps polling until the caller cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Pause between polls
    pub interval: Duration,

    /// Overall deadline, if any
    pub timeout: Option<Duration>,
}

impl PollSchedule {
    /// Schedule that gives up after `timeout`.
    #[must_use]
    pub const fn bounded(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
        }
    }

    /// Schedule without an overall deadline.
    #[must_use]
    pub const fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    /// Returns true once `elapsed` is past the deadline.
    #[must_use]
    pub fn is_expired(&self, elapsed: Duration) -> bool {
        self.timeout.is_some_and(|timeout| elapsed > timeout)
    }
}
