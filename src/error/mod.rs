//! Error types and handling for `jilo`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration for wrapped one-off errors
//! - Provides recovery hints for user-facing errors
//! - Per-record errors are caught at the sync orchestrator and converted
//!   to a skip + log; configuration errors terminate the invocation

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `jilo` operations.
#[derive(Error, Debug)]
pub enum JiloError {
    // === Configuration Errors ===
    /// Workspace not initialized.
    #[error("Workspace not initialized: run 'jilo init' first")]
    NotInitialized,

    /// Already initialized.
    #[error("Already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    /// No projects configured at all.
    #[error("No projects configured: use 'jilo clone <uri>' first")]
    NoProjectsConfigured,

    /// Project key is not configured locally.
    #[error("Project not configured: {key}")]
    ProjectNotConfigured { key: String },

    /// Project URI could not be parsed.
    #[error("Bad project URI: {uri}")]
    BadProjectUri { uri: String },

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config schema version is newer than this binary understands.
    #[error("Config schema version {found} is newer than supported {supported}")]
    ConfigSchemaTooNew { found: u32, supported: u32 },

    // === Record Errors ===
    /// Issue with the specified key was not found locally.
    #[error("Issue not found: {key}")]
    IssueNotFound { key: String },

    /// Field does not exist on the issue schema.
    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    /// Attempted to modify a server-owned field.
    #[error("Field is read-only: {field}")]
    ReadOnlyField { field: String },

    /// A field value failed to parse to its schema type.
    #[error("Failed deserializing field '{field}': {reason}")]
    Deserialize { field: String, reason: String },

    /// Malformed record from the remote system or the cache.
    #[error("Malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// Issue type not valid for the project.
    #[error("Invalid issue type '{issuetype}' for project {project}")]
    InvalidIssueType { issuetype: String, project: String },

    /// Epic/linked-issue search string matched nothing.
    #[error("No issue matches '{search}'")]
    LinkedIssueNotFound { search: String },

    /// Epic/linked-issue search string matched more than one issue.
    #[error("More than one issue matches '{search}'")]
    AmbiguousLinkedIssue { search: String },

    // === Merge / Resolution Errors ===
    /// Editor returned unusable text during conflict resolution or edit.
    #[error("Failed parsing editor output: {reason}")]
    EditorParse { reason: String },

    /// Interactive conflict resolution exhausted its retries.
    #[error("Conflict resolution failed for {key}")]
    ConflictResolutionFailed { key: String },

    /// A merged draft still carries conflict markers.
    #[error("Unresolved conflicts remain on {key}: {fields:?}")]
    UnresolvedConflicts { key: String, fields: Vec<String> },

    // === Transport Errors ===
    /// Remote system could not be reached.
    #[error("Remote unavailable: {0}")]
    TransportUnavailable(String),

    /// Remote system returned a non-success response.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Project metadata could not be pulled.
    #[error("Failed pulling metadata for project {key}: {reason}")]
    FailedPullingProjectMeta { key: String, reason: String },

    /// A push pass completed with failures.
    #[error("Pushed {pushed} of {total} issues")]
    PushIncomplete { pushed: usize, total: usize },

    // === I/O Errors ===
    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error for one-off failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JiloError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::NoProjectsConfigured
                | Self::ProjectNotConfigured { .. }
                | Self::BadProjectUri { .. }
                | Self::IssueNotFound { .. }
                | Self::UnknownField { .. }
                | Self::ReadOnlyField { .. }
                | Self::InvalidIssueType { .. }
                | Self::LinkedIssueNotFound { .. }
                | Self::AmbiguousLinkedIssue { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run: jilo init"),
            Self::NoProjectsConfigured => Some("Run: jilo clone https://jira.example.com/PROJ"),
            Self::ProjectNotConfigured { .. } => {
                Some("Clone the project first: jilo clone https://<host>/<KEY>")
            }
            Self::BadProjectUri { .. } => {
                Some("A project URI looks like https://jira.example.com/PROJ")
            }
            Self::ReadOnlyField { .. } => {
                Some("Server-owned fields can only change via 'jilo pull'")
            }
            Self::ConflictResolutionFailed { .. } => {
                Some("Re-run the sync and resolve the conflict blocks in your editor")
            }
            Self::AmbiguousLinkedIssue { .. } => Some("Reference the issue by key (eg. PROJ-123)"),
            Self::TransportUnavailable(_) => Some("Check your network and the configured hostname"),
            _ => None,
        }
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Create a malformed-record error with the record key for context.
    #[must_use]
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a field deserialization error.
    #[must_use]
    pub fn deserialize(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Deserialize {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `JiloError`.
pub type Result<T> = std::result::Result<T, JiloError>;
