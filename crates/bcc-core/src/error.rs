//! Error types for BCC operations.
//!
//! Every engine call returns one of these kinds so callers can tell a lock
//! timeout from a domain conflict or a remote failure without parsing strings.

use thiserror::Error;

/// Main error type for BCC operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid configuration or credential combination
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// CA bundle or client certificate could not be loaded
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// Connection, DNS or TLS failure before a response was received
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Server rejected the mutation with a non-lock conflict
    #[error("Conflict ({alias}): {message}")]
    Conflict {
        /// Server-supplied error alias
        alias: String,
        /// Server-supplied message and details
        message: String,
    },

    /// Retry or wait deadline exceeded
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Non-success response from the control plane
    #[error("Remote error {status} on {url}: {body}")]
    Remote {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Response body could not be decoded
    #[error("Decode failed on {url}: {message}\n{body}")]
    DecodeError {
        /// Requested URL
        url: String,
        /// Decoder message
        message: String,
        /// Raw response body
        body: String,
    },

    /// Request payload could not be serialised
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// Asynchronous task finished in error status
    #[error("Task {task_id} in error status, step: {step}")]
    TaskFailed {
        /// Task identifier
        task_id: String,
        /// Step the task failed on
        step: String,
    },

    /// Caller cancelled the operation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Specialized result type for BCC operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::CertificateError(_) => "CERTIFICATE_ERROR",
            Self::TransportError(_) => "TRANSPORT_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::Timeout(_) => "TIMEOUT",
            Self::Remote { .. } => "REMOTE_ERROR",
            Self::DecodeError { .. } => "DECODE_ERROR",
            Self::EncodeError(_) => "ENCODE_ERROR",
            Self::TaskFailed { .. } => "TASK_FAILED",
            Self::Cancelled(_) => "CANCELLED",
            Self::IoError(_) => "IO_ERROR",
        }
    }

    /// HTTP status carried by a remote error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for remote 404 responses.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }

    /// Returns true if a retry or wait deadline was exceeded.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns true if the caller cancelled the operation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Build a decode error for a response body.
    #[must_use]
    pub fn decode(url: impl Into<String>, message: impl ToString, body: &[u8]) -> Self {
        Self::DecodeError {
            url: url.into(),
            message: message.to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("HTTP request timed out: {err}"))
        } else {
            Self::TransportError(format!("HTTP request failure: {err}"))
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("Invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::EncodeError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(format!("Invalid configuration: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
