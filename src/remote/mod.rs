//! The remote-transport boundary.
//!
//! The sync orchestrator talks to the ticket server exclusively through the
//! [`Transport`] trait: synchronous, fallible calls that fetch pages of
//! updated records, fetch single records, and create/update records. The
//! production implementation is [`HttpTransport`]; tests substitute an
//! in-memory fake.

pub mod convert;
pub mod http;

pub use http::HttpTransport;

use crate::config::{CustomFieldMap, ProjectMeta};
use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// One page of a paginated search.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Raw API issue objects, in the order returned by the server.
    pub issues: Vec<Value>,
    /// Total number of matching records across all pages.
    pub total: usize,
}

/// Project metadata needed to create and convert records.
#[derive(Debug, Clone, Default)]
pub struct ProjectDetails {
    pub name: Option<String>,
    pub issuetypes: BTreeSet<String>,
    pub priorities: BTreeSet<String>,
    pub components: BTreeSet<String>,
    pub customfields: CustomFieldMap,
}

/// Synchronous remote API surface.
pub trait Transport {
    /// Fetch project metadata (issue types, priorities, components,
    /// custom-field mapping).
    ///
    /// # Errors
    ///
    /// Transport or API failures.
    fn get_project_details(&self, project: &ProjectMeta) -> Result<ProjectDetails>;

    /// Fetch one page of records updated since the watermark (all records
    /// when `since` is `None`).
    ///
    /// # Errors
    ///
    /// Transport or API failures.
    fn fetch_updated(
        &self,
        project: &ProjectMeta,
        since: Option<&str>,
        start_at: usize,
        max_results: usize,
    ) -> Result<SearchPage>;

    /// Fetch a single record by key.
    ///
    /// # Errors
    ///
    /// Transport or API failures.
    fn fetch_issue(&self, project: &ProjectMeta, key: &str) -> Result<Value>;

    /// Create a record; returns the server-assigned key.
    ///
    /// # Errors
    ///
    /// Transport or API failures.
    fn create_issue(&self, project: &ProjectMeta, fields: &Map<String, Value>) -> Result<String>;

    /// Update a record's fields.
    ///
    /// # Errors
    ///
    /// Transport or API failures.
    fn update_issue(
        &self,
        project: &ProjectMeta,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<()>;
}
