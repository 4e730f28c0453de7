//! `jilo` - an offline-first Jira client.
//!
//! Issues are cached locally in SQLite, edited while disconnected, and
//! reconciled against the remote server with a field-level three-way merge
//! when connectivity returns.
//!
//! Module map:
//! - [`model`] - the issue record, its snapshot and the diff/patch layer
//! - [`merge`] - the three-way merge engine and conflict resolution
//! - [`sync`] - the pull/push orchestrator
//! - [`remote`] - the HTTP transport boundary
//! - [`storage`] - the in-memory store and its SQLite cache
//! - [`cli`], [`config`], [`format`], [`error`] - the surrounding tool

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod merge;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{JiloError, Result};
