//! Configuration management for `jilo`.
//!
//! Configuration lives in a `.jilo/` workspace directory next to the data
//! it serves:
//!
//! - `config.yaml` - schema version, configured projects, sync options
//! - `cache.db`    - the SQLite issue cache
//!
//! The directory is discovered by honoring `JILO_DIR` when set, otherwise
//! walking up from the working directory. Config files written by older
//! releases are upgraded in place from their raw YAML form before
//! deserialization.

use crate::error::{JiloError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the workspace directory.
pub const WORKSPACE_DIR: &str = ".jilo";
/// Config filename inside the workspace directory.
pub const CONFIG_FILE: &str = "config.yaml";
/// Cache filename inside the workspace directory.
pub const CACHE_FILE: &str = "cache.db";

/// Config schema version written by this release.
pub const CURRENT_CONFIG_SCHEMA: u32 = 2;

/// CLI-level overrides threaded into command execution.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Explicit workspace directory (bypasses discovery).
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub no_color: bool,
    pub verbose: bool,
}

/// Mapping of logical custom-field names to the remote system's
/// `customfield_<id>` identifiers, refreshed from project metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_link: Option<String>,
    /// Site-specific custom fields: logical name -> customfield id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended: BTreeMap<String, String>,
}

impl CustomFieldMap {
    /// Iterate (field path, customfield id) pairs for every mapped field.
    /// Extension fields are yielded under their dotted path.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        let named = [
            ("epic_link", &self.epic_link),
            ("epic_name", &self.epic_name),
            ("sprint", &self.sprint),
            ("story_points", &self.story_points),
            ("parent_link", &self.parent_link),
        ];
        named
            .into_iter()
            .filter_map(|(name, id)| id.as_deref().map(|id| (name.to_string(), id)))
            .chain(
                self.extended
                    .iter()
                    .map(|(name, id)| (format!("extended.{name}"), id.as_str())),
            )
    }
}

/// Properties of one configured remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Watermark: when this project last completed a pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub issuetypes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub priorities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub components: BTreeSet<String>,
    #[serde(default)]
    pub customfields: CustomFieldMap,
}

fn default_protocol() -> String {
    "https".to_string()
}

impl ProjectMeta {
    /// Build a project from a `protocol://hostname/KEY` URI.
    ///
    /// # Errors
    ///
    /// Returns [`JiloError::BadProjectUri`] when any part is missing.
    pub fn factory(uri: &str) -> Result<Self> {
        let bad = || JiloError::BadProjectUri {
            uri: uri.to_string(),
        };

        let (protocol, rest) = uri.split_once("://").ok_or_else(bad)?;
        let (hostname, key) = rest.split_once('/').ok_or_else(bad)?;
        if protocol.is_empty() || hostname.is_empty() || key.is_empty() || key.contains('/') {
            return Err(bad());
        }

        Ok(Self {
            key: key.to_string(),
            name: None,
            protocol: protocol.to_string(),
            hostname: hostname.to_string(),
            username: None,
            password: None,
            last_updated: None,
            issuetypes: BTreeSet::new(),
            priorities: BTreeSet::new(),
            components: BTreeSet::new(),
            customfields: CustomFieldMap::default(),
        })
    }

    #[must_use]
    pub fn jira_server(&self) -> String {
        format!("{}://{}", self.protocol, self.hostname)
    }

    #[must_use]
    pub fn project_uri(&self) -> String {
        format!("{}/{}", self.jira_server(), self.key)
    }

    /// Stable identifier for this project, derived from its URI.
    #[must_use]
    pub fn id(&self) -> String {
        let digest = Sha256::digest(self.project_uri().as_bytes());
        format!("{digest:x}")
    }
}

/// Sync tuning options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    25
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// The application configuration, persisted as `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Configured projects keyed by project id (hash of the project URI).
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectMeta>,
    #[serde(default)]
    pub sync: SyncOptions,
}

fn default_schema_version() -> u32 {
    CURRENT_CONFIG_SCHEMA
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_CONFIG_SCHEMA,
            projects: BTreeMap::new(),
            sync: SyncOptions::default(),
        }
    }
}

impl AppConfig {
    /// Load the config from the workspace directory, upgrading old schema
    /// versions in their raw YAML form first. A missing file yields the
    /// default config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, unparseable, or written
    /// by a newer release.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        let mut raw: serde_yaml::Value = serde_yaml::from_str(&contents)?;

        let found = raw
            .get("schema_version")
            .and_then(serde_yaml::Value::as_u64)
            .map_or(1, |v| u32::try_from(v).unwrap_or(u32::MAX));

        if found > CURRENT_CONFIG_SCHEMA {
            return Err(JiloError::ConfigSchemaTooNew {
                found,
                supported: CURRENT_CONFIG_SCHEMA,
            });
        }
        if found < 2 {
            upgrade_v1_to_v2(&mut raw);
        }

        let config: Self = serde_yaml::from_value(raw)?;
        Ok(Self {
            schema_version: CURRENT_CONFIG_SCHEMA,
            ..config
        })
    }

    /// Write the config to the workspace directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let contents = serde_yaml::to_string(self)?;
        fs::write(dir.join(CONFIG_FILE), contents)?;
        Ok(())
    }

    /// Look up a configured project by key or id.
    #[must_use]
    pub fn find_project(&self, key_or_id: &str) -> Option<&ProjectMeta> {
        self.projects.get(key_or_id).or_else(|| {
            self.projects
                .values()
                .find(|p| p.key.eq_ignore_ascii_case(key_or_id))
        })
    }
}

/// v1 configs stored the watermark as `last_sync`; v2 renamed it.
fn upgrade_v1_to_v2(raw: &mut serde_yaml::Value) {
    if let Some(projects) = raw
        .get_mut("projects")
        .and_then(serde_yaml::Value::as_mapping_mut)
    {
        for (_, project) in projects.iter_mut() {
            if let Some(map) = project.as_mapping_mut() {
                if let Some(value) = map.remove("last_sync") {
                    map.insert(serde_yaml::Value::from("last_updated"), value);
                }
            }
        }
    }
    if let Some(map) = raw.as_mapping_mut() {
        map.insert(
            serde_yaml::Value::from("schema_version"),
            serde_yaml::Value::from(2u32),
        );
    }
}

/// Discover the active `.jilo` workspace directory.
///
/// Honors `JILO_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns [`JiloError::NotInitialized`] when no workspace is found.
pub fn discover_workspace(start: Option<&Path>) -> Result<PathBuf> {
    if let Ok(dir) = env::var("JILO_DIR") {
        let path = PathBuf::from(dir);
        if path.is_dir() {
            return Ok(path);
        }
        return Err(JiloError::NotInitialized);
    }

    let mut current = match start {
        Some(p) => p.to_path_buf(),
        None => env::current_dir()?,
    };
    loop {
        let candidate = current.join(WORKSPACE_DIR);
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !current.pop() {
            return Err(JiloError::NotInitialized);
        }
    }
}

/// Resolve the workspace directory from overrides or discovery.
///
/// # Errors
///
/// Returns [`JiloError::NotInitialized`] when no workspace is found.
pub fn resolve_workspace(cli: &CliOverrides) -> Result<PathBuf> {
    match &cli.dir {
        Some(dir) if dir.is_dir() => Ok(dir.clone()),
        Some(_) => Err(JiloError::NotInitialized),
        None => discover_workspace(None),
    }
}

/// Path of the cache database inside the workspace.
#[must_use]
pub fn cache_path(dir: &Path) -> PathBuf {
    dir.join(CACHE_FILE)
}
