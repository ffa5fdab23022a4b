//! Waiting for a resource's `locked` flag to clear.

use crate::manager::{pause, Manager};
use crate::Result;
use bcc_core::query::Arguments;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lock flag carried by nearly every resource representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LockState {
    /// True while the server is busy with the resource
    #[serde(default)]
    pub locked: bool,
}

impl Manager {
    /// Block until the resource at `path` reports `locked: false`.
    ///
    /// There is no overall deadline: this returns only when the lock clears,
    /// a fetch fails, or `cancel` fires. Wrap it in your own timeout if you
    /// need a bound.
    ///
    /// # Errors
    ///
    /// Returns the first fetch error unchanged, or [`bcc_core::Error::Cancelled`].
    pub async fn wait_unlocked(&self, cancel: &CancellationToken, path: &str) -> Result<()> {
        let schedule = self.config().lock_schedule();
        loop {
            let state: LockState = self.get(cancel, path, &Arguments::new()).await?;
            if !state.locked {
                return Ok(());
            }
            debug!(path, "Resource locked, checking again in {:?}", schedule.interval);
            pause(cancel, schedule.interval).await?;
        }
    }
}
