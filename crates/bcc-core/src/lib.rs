//! # bcc-core
//!
//! Core types and utilities for the BCC cloud control-plane client.
//!
//! This crate holds everything the request engine needs that does not perform I/O:
//! the error taxonomy, configuration and credential types, query arguments and the
//! protocol constants shared by every call.
//!
//! ## Modules
//!
//! - [`error`] - Error types callers can branch on
//! - [`config`] - Engine configuration, TLS material and credentials
//! - [`query`] - Mergeable query-argument sets
//! - [`client`] - Protocol constants and polling schedules

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod query;

// Re-export commonly used types
pub use error::{Error, Result};
pub use query::Arguments;
