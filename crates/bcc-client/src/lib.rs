//! Request execution engine for the BCC cloud control-plane API.
//!
//! Resource modules call into a shared [`Manager`] through four shapes: fetch
//! one ([`Manager::get`]), fetch a page ([`Manager::get_page`] and
//! [`Manager::collect`]), mutate ([`Manager::mutate`]) and delete
//! ([`Manager::delete`]). The manager owns lock-conflict retries, asynchronous
//! task tracking and pagination so none of that is repeated per resource.
//!
//! Every operation takes a [`CancellationToken`]; cancelling it ends any pending
//! retry or poll promptly with [`Error::Cancelled`].

#![deny(missing_docs)]

pub mod kubeconfig;
pub mod lock;
pub mod manager;
pub mod pager;
pub mod tasks;
pub mod transport;

pub use bcc_core::config::{Credentials, ManagerConfig, TlsConfig};
pub use bcc_core::{Arguments, Error};
pub use kubeconfig::{DirectorySink, KubeconfigSink};
pub use lock::LockState;
pub use manager::{ApiRequest, Execution, Manager, ManagerBuilder, Payload};
pub use pager::Page;
pub use tasks::{JobStatus, TaskIds};
pub use tokio_util::sync::CancellationToken;

/// Convenient result alias that reuses the shared BCC error type.
pub type Result<T> = bcc_core::Result<T>;
