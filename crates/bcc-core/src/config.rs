//! Configuration structures for the BCC client.
//!
//! [`ManagerConfig`] holds the non-secret knobs of an engine instance (base URL,
//! deadlines, poll intervals, pool sizing). [`Credentials`] carries the bearer
//! token and the [`TlsConfig`] used to build the transport.

use crate::client::{
    PollSchedule, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_LOCK_POLL_INTERVAL_MS,
    DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST, DEFAULT_REQUEST_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TASK_POLL_INTERVAL_MS, DEFAULT_TASK_TIMEOUT_SECS,
};
use crate::Error;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Configuration for an engine instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManagerConfig {
    /// Control-plane base URL
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Deadline for the lock-conflict retry loop, in seconds
    #[validate(range(min = 1, max = 86_400))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause between lock-conflict retries, in milliseconds
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Deadline for each asynchronous task, in seconds
    #[validate(range(min = 1, max = 86_400))]
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Pause between job-status polls, in milliseconds
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,

    /// Pause between lock-state polls, in milliseconds
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,

    /// User-Agent override
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Connection pool idle timeout, in seconds
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// TCP connect timeout, in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_request_interval_ms() -> u64 {
    DEFAULT_REQUEST_INTERVAL_MS
}

const fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

const fn default_task_poll_interval_ms() -> u64 {
    DEFAULT_TASK_POLL_INTERVAL_MS
}

const fn default_lock_poll_interval_ms() -> u64 {
    DEFAULT_LOCK_POLL_INTERVAL_MS
}

const fn default_pool_idle_timeout_secs() -> u64 {
    DEFAULT_POOL_IDLE_TIMEOUT
}

const fn default_pool_max_idle_per_host() -> usize {
    DEFAULT_POOL_MAX_IDLE_PER_HOST
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT
}

impl ManagerConfig {
    /// Create a configuration for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            base_url: base_url.into(),
            ..Self::default()
        };

        config.check()?;
        Ok(config)
    }

    /// Run range and URL validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] listing the invalid fields.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()?;
        Ok(())
    }

    /// Set the lock-conflict retry deadline in seconds.
    #[must_use]
    pub const fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the lock-conflict retry interval in milliseconds.
    #[must_use]
    pub const fn with_request_interval(mut self, millis: u64) -> Self {
        self.request_interval_ms = millis;
        self
    }

    /// Set the per-task deadline in seconds.
    #[must_use]
    pub const fn with_task_timeout(mut self, seconds: u64) -> Self {
        self.task_timeout_secs = seconds;
        self
    }

    /// Set the job-status poll interval in milliseconds.
    #[must_use]
    pub const fn with_task_poll_interval(mut self, millis: u64) -> Self {
        self.task_poll_interval_ms = millis;
        self
    }

    /// Set the lock-state poll interval in milliseconds.
    #[must_use]
    pub const fn with_lock_poll_interval(mut self, millis: u64) -> Self {
        self.lock_poll_interval_ms = millis;
        self
    }

    /// Lock-conflict retry deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Lock-conflict retry interval.
    #[must_use]
    pub const fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Bounded schedule for job-status polling.
    #[must_use]
    pub const fn task_schedule(&self) -> PollSchedule {
        PollSchedule::bounded(
            Duration::from_millis(self.task_poll_interval_ms),
            Duration::from_secs(self.task_timeout_secs),
        )
    }

    /// Unbounded schedule for lock-state polling.
    #[must_use]
    pub const fn lock_schedule(&self) -> PollSchedule {
        PollSchedule::unbounded(Duration::from_millis(self.lock_poll_interval_ms))
    }

    /// Connection pool idle timeout.
    #[must_use]
    pub const fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    /// TCP connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Parse and validate the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or cannot carry a path.
    pub fn parse_base_url(&self) -> Result<Url, Error> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::ConfigError(format!("Invalid base URL: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::ConfigError(format!(
                "Base URL `{}` cannot carry a path",
                self.base_url
            )));
        }
        Ok(url)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            request_interval_ms: default_request_interval_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            user_agent: None,
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// TLS material for the transport.
///
/// Each certificate field holds either a path to a PEM file or the PEM text
/// itself; a value naming an existing file is read from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Trusted CA bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,

    /// Client certificate for mutual TLS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,

    /// Private key matching `client_cert`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,

    /// Skip server certificate verification. Dangerous; never on by default.
    #[serde(default)]
    pub insecure: bool,
}

impl TlsConfig {
    /// Check that the certificate options form a usable combination.
    ///
    /// A client certificate needs its key and a trusted root; a key without a
    /// certificate is rejected as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the missing piece.
    pub fn check_pairing(&self) -> Result<(), Error> {
        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => Err(Error::ConfigError(
                "client cert cannot be applied without key file".to_string(),
            )),
            (None, Some(_)) => Err(Error::ConfigError(
                "client key cannot be applied without client cert file".to_string(),
            )),
            (Some(_), Some(_)) if self.ca_cert.is_none() => Err(Error::ConfigError(
                "client auth requires a trusted root CA certificate".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Credential material owned by an engine instance.
#[derive(Debug)]
pub struct Credentials {
    token: SecretString,
    tls: TlsConfig,
}

impl Credentials {
    /// Create credentials from a bearer token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            tls: TlsConfig::default(),
        }
    }

    /// Trust the given CA bundle (path or PEM text).
    #[must_use]
    pub fn with_ca_cert(mut self, ca_cert: impl Into<String>) -> Self {
        self.tls.ca_cert = Some(ca_cert.into());
        self
    }

    /// Present a client certificate and key (paths or PEM text).
    #[must_use]
    pub fn with_client_cert(mut self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.tls.client_cert = Some(cert.into());
        self.tls.client_key = Some(key.into());
        self
    }

    /// Disable server certificate verification.
    #[must_use]
    pub const fn with_insecure(mut self, insecure: bool) -> Self {
        self.tls.insecure = insecure;
        self
    }

    /// Split into the token and TLS material.
    #[must_use]
    pub fn into_parts(self) -> (SecretString, TlsConfig) {
        (self.token, self.tls)
    }
}
