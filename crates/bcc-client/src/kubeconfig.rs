//! Kubeconfig downloads.
//!
//! Responses from `v1/kubernetes/<id>/config` are YAML credential bundles. The
//! engine validates them and hands the raw bytes to a [`KubeconfigSink`] instead
//! of the JSON decoder.

use crate::Result;
use async_trait::async_trait;
use bcc_core::Error;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

/// Destination for downloaded kubeconfig bundles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KubeconfigSink: Send + Sync {
    /// Persist `contents` for `cluster_id`, returning where it was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle cannot be written.
    async fn store(&self, cluster_id: &str, contents: &[u8]) -> Result<PathBuf>;
}

/// Writes `kubectl-<id>.yaml` into a directory.
///
/// Without an explicit directory the process working directory is used,
/// resolved at write time.
#[derive(Debug, Clone, Default)]
pub struct DirectorySink {
    dir: Option<PathBuf>,
}

impl DirectorySink {
    /// Sink targeting the process working directory.
    #[must_use]
    pub const fn current_dir() -> Self {
        Self { dir: None }
    }

    /// Sink targeting `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Configured directory, if any.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn resolve_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir()
                .map_err(|err| Error::IoError(format!("Cannot find work directory: {err}"))),
        }
    }
}

#[async_trait]
impl KubeconfigSink for DirectorySink {
    async fn store(&self, cluster_id: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.resolve_dir()?.join(file_name(cluster_id));
        tokio::fs::write(&path, contents).await.map_err(|err| {
            Error::IoError(format!("Kubeconfig save failed at {}: {err}", path.display()))
        })?;
        info!(cluster_id, path = %path.display(), "Saved kubeconfig");
        Ok(path)
    }
}

/// File name used for a cluster's kubeconfig.
#[must_use]
pub fn file_name(cluster_id: &str) -> String {
    format!("kubectl-{cluster_id}.yaml")
}

/// Cluster identifier of a kubeconfig download URL.
///
/// Matches paths ending in `v1/kubernetes/<id>/config`, whatever prefix the
/// base URL carries.
#[must_use]
pub fn cluster_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    match segments.as_slice() {
        [.., "v1", "kubernetes", id, "config"] if !id.is_empty() => Some((*id).to_string()),
        _ => None,
    }
}

/// Check that a downloaded bundle parses as YAML.
pub(crate) fn validate(url: &Url, contents: &[u8]) -> Result<()> {
    serde_yaml::from_slice::<serde_yaml::Value>(contents)
        .map(|_| ())
        .map_err(|err| Error::decode(url.as_str(), format!("YAML decode failed: {err}"), contents))
}
