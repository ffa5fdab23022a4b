//! Request execution engine.
//!
//! [`Manager::execute`] sends one request, retries it while the server reports
//! a generic object lock (HTTP 409), and returns the task identifiers from the
//! response header together with the raw body. The higher level verbs decode
//! the body and wait for the tasks.

use crate::kubeconfig::{self, DirectorySink, KubeconfigSink};
use crate::tasks::TaskIds;
use crate::transport::build_http_client;
use crate::Result;
use bcc_core::client::{ACCEPT_LANGUAGE, OBJECT_LOCKED_ALIAS, TASKS_HEADER};
use bcc_core::config::{Credentials, ManagerConfig};
use bcc_core::query::Arguments;
use bcc_core::Error;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// A single call against the control plane.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Arguments,
    body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Create a request without query or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Arguments::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Attach query arguments.
    #[must_use]
    pub fn with_query(mut self, query: Arguments) -> Self {
        self.query = query;
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodeError`] if the payload cannot be serialised.
    pub fn with_json<B>(mut self, payload: &B) -> Result<Self>
    where
        B: Serialize + ?Sized,
    {
        self.body = Some(serde_json::to_vec(payload)?);
        Ok(self)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query arguments.
    #[must_use]
    pub const fn query(&self) -> &Arguments {
        &self.query
    }

    /// Encoded body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The server sent no body
    Empty,
    /// Raw body awaiting JSON decoding
    Body(Vec<u8>),
    /// Kubeconfig bundle already handed to the sink
    Kubeconfig {
        /// Cluster identifier parsed from the URL
        cluster_id: String,
        /// Where the sink stored the bundle
        location: PathBuf,
    },
}

/// Outcome of [`Manager::execute`].
#[derive(Debug, Clone)]
pub struct Execution {
    url: Url,
    tasks: TaskIds,
    payload: Payload,
}

impl Execution {
    /// Requested URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Task identifiers announced by the response header.
    #[must_use]
    pub const fn tasks(&self) -> &TaskIds {
        &self.tasks
    }

    /// Response payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Raw body awaiting decoding; empty for every other payload.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        match &self.payload {
            Payload::Body(body) => body,
            Payload::Empty | Payload::Kubeconfig { .. } => &[],
        }
    }

    /// Decode the body as JSON.
    ///
    /// Empty bodies and kubeconfig downloads decode as JSON `null`, so `()`,
    /// `Option<_>` and [`Value`] targets accept them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeError`] with the URL and raw body on failure.
    pub fn decode<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match &self.payload {
            Payload::Body(body) => serde_json::from_slice(body).map_err(|err| {
                Error::decode(self.url.as_str(), format!("JSON decode failed: {err}"), body)
            }),
            Payload::Empty | Payload::Kubeconfig { .. } => T::deserialize(Value::Null)
                .map_err(|err| Error::decode(self.url.as_str(), err, b"")),
        }
    }
}

/// Body of a 409 response.
#[derive(Debug, Default, Deserialize)]
struct LockConflict {
    #[serde(default)]
    details: Vec<Value>,
    #[serde(default)]
    error_alias: Option<Vec<Value>>,
    #[serde(default)]
    non_field_errors: Vec<Value>,
}

impl LockConflict {
    fn alias(&self) -> Option<String> {
        self.error_alias
            .as_ref()
            .and_then(|aliases| aliases.first())
            .map(value_text)
    }

    /// Domain conflicts are fatal; only the generic lock is retried.
    fn into_domain_error(self) -> Option<Error> {
        let alias = self.alias()?;
        if alias == OBJECT_LOCKED_ALIAS {
            return None;
        }
        let reason = self
            .non_field_errors
            .first()
            .map(value_text)
            .unwrap_or_default();
        let details = serde_json::to_string(&self.details).unwrap_or_default();
        Some(Error::Conflict {
            alias,
            message: format!("{reason}: {details}"),
        })
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Builder for [`Manager`].
pub struct ManagerBuilder {
    credentials: Credentials,
    config: ManagerConfig,
    sink: Option<Arc<dyn KubeconfigSink>>,
}

impl ManagerBuilder {
    /// Start from credentials with the default configuration.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            config: ManagerConfig::default(),
            sink: None,
        }
    }

    /// Override the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Send kubeconfig downloads to `sink` instead of the working directory.
    #[must_use]
    pub fn with_kubeconfig_sink(mut self, sink: impl KubeconfigSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the transport cannot
    /// be built from the TLS material.
    pub fn build(self) -> Result<Manager> {
        self.config.check()?;
        let base_url = self.config.parse_base_url()?;

        let (token, tls) = self.credentials.into_parts();
        let http = build_http_client(&tls, &self.config)?;

        Ok(Manager {
            inner: Arc::new(Inner {
                http,
                base_url,
                token,
                request_timeout: self.config.request_timeout(),
                request_interval: self.config.request_interval(),
                config: self.config,
                sink: self
                    .sink
                    .unwrap_or_else(|| Arc::new(DirectorySink::current_dir())),
            }),
        })
    }
}

/// Engine instance shared by every resource operation.
///
/// Cloning is cheap and every clone shares the same connection pool. Calls
/// never share cancellation state; each takes its own [`CancellationToken`].
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: Url,
    token: SecretString,
    request_timeout: Duration,
    request_interval: Duration,
    config: ManagerConfig,
    sink: Arc<dyn KubeconfigSink>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("base_url", &self.inner.base_url.as_str())
            .field("request_timeout", &self.inner.request_timeout)
            .field("request_interval", &self.inner.request_interval)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Construct a manager from credentials with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`ManagerBuilder::build`].
    pub fn new(credentials: Credentials) -> Result<Self> {
        ManagerBuilder::new(credentials).build()
    }

    /// Start a builder.
    #[must_use]
    pub fn builder(credentials: Credentials) -> ManagerBuilder {
        ManagerBuilder::new(credentials)
    }

    /// Return the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Return the configuration the manager was built with.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Fetch one resource.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Manager::execute`] or decoding.
    pub async fn get<T>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        args: &Arguments,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!(path, "GET");
        let request = ApiRequest::get(path).with_query(args.clone());
        self.execute(cancel, &request).await?.decode()
    }

    /// Create or update a resource and wait for the tasks it starts.
    ///
    /// The response is decoded before waiting; a decode failure is reported
    /// only after every task has finished.
    ///
    /// # Errors
    ///
    /// Returns the first failure among execution, task waiting and decoding.
    pub async fn mutate<B, T>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        payload: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%method, path, "mutate");
        let request = ApiRequest::new(method, path).with_json(payload)?;
        self.execute_and_wait(cancel, &request).await
    }

    /// Delete a resource and wait for the tasks it starts.
    ///
    /// # Errors
    ///
    /// Returns the first failure among execution, task waiting and decoding.
    pub async fn delete<T>(&self, cancel: &CancellationToken, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!(path, "DELETE");
        let request = ApiRequest::new(Method::DELETE, path);
        self.execute_and_wait(cancel, &request).await
    }

    async fn execute_and_wait<T>(
        &self,
        cancel: &CancellationToken,
        request: &ApiRequest,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let execution = self.execute(cancel, request).await?;
        let decoded = execution.decode();
        self.wait_tasks(cancel, execution.tasks()).await?;
        decoded
    }

    /// Send a request, retrying while the target is locked.
    ///
    /// A 409 whose alias is the generic lock (or absent) is retried every
    /// request interval until the request timeout; any other alias fails at
    /// once with [`Error::Conflict`]. The body is replayed unchanged on every
    /// attempt. Transport failures and other non-2xx statuses are not retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] as soon as `cancel` fires, whichever
    /// suspension point the call is in.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &ApiRequest,
    ) -> Result<Execution> {
        let url = self.build_url(request.path(), request.query())?;
        let interval = self.inner.request_interval;
        let deadline = Instant::now() + self.inner.request_timeout;
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempt: u32 = 0;
        let response = loop {
            attempt += 1;
            debug!(method = %request.method(), %url, attempt, "Perform request");

            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(&url)),
                result = self.prepare(request, &url).send() => result?,
            };

            if response.status() != StatusCode::CONFLICT {
                break response;
            }

            let body = read_body(cancel, &url, response).await?;
            let conflict: LockConflict = serde_json::from_slice(&body).map_err(|err| {
                Error::decode(url.as_str(), format!("Lock conflict decode failed: {err}"), &body)
            })?;
            if let Some(error) = conflict.into_domain_error() {
                warn!(%url, %error, "Conflict is not a lock, giving up");
                return Err(error);
            }

            info!(%url, attempt, "Object locked, retrying in {:?}", interval);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(&url)),
                () = sleep_until(deadline) => {
                    warn!(%url, "Waiting unlock took more than {:?}", self.inner.request_timeout);
                    return Err(Error::Timeout(format!(
                        "Waiting unlock for {url} took more than {:?}",
                        self.inner.request_timeout
                    )));
                }
                _ = ticker.tick() => {}
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(%url, %status, "Error response");
            let body = read_body(cancel, &url, response).await?;
            return Err(Error::Remote {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let tasks = response
            .headers()
            .get(TASKS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(TaskIds::parse)
            .unwrap_or_default();
        if !tasks.is_empty() {
            debug!(%url, %tasks, "Tasks announced");
        }

        let body = read_body(cancel, &url, response).await?;
        let payload = if body.is_empty() {
            Payload::Empty
        } else if let Some(cluster_id) = kubeconfig::cluster_id(&url) {
            kubeconfig::validate(&url, &body)?;
            let location = self.inner.sink.store(&cluster_id, &body).await?;
            Payload::Kubeconfig {
                cluster_id,
                location,
            }
        } else {
            Payload::Body(body)
        };

        Ok(Execution {
            url,
            tasks,
            payload,
        })
    }

    fn prepare(&self, request: &ApiRequest, url: &Url) -> RequestBuilder {
        let mut builder = self
            .inner
            .http
            .request(request.method().clone(), url.clone())
            .bearer_auth(self.inner.token.expose_secret())
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header(ACCEPT, "application/json");

        if let Some(body) = request.body() {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }
        builder
    }

    /// Join `path` onto the base URL and append the query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the base URL cannot carry a path.
    pub fn build_url(&self, path: &str, query: &Arguments) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                Error::ConfigError(format!(
                    "Base URL `{}` cannot carry a path",
                    self.inner.base_url
                ))
            })?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
            if path.ends_with('/') {
                segments.push("");
            }
        }
        url.set_query(None);
        if !query.is_empty() {
            url.set_query(Some(&query.to_query_string()));
        }
        Ok(url)
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub(crate) async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled("operation cancelled while waiting".to_string())),
        () = sleep(duration) => Ok(()),
    }
}

fn cancelled(url: &Url) -> Error {
    Error::Cancelled(format!("request to {url} cancelled"))
}

async fn read_body(cancel: &CancellationToken, url: &Url, response: Response) -> Result<Vec<u8>> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancelled(url)),
        result = response.bytes() => Ok(result?.to_vec()),
    }
}
