//! Command implementations.

pub mod clone;
pub mod completions;
pub mod edit;
pub mod import;
pub mod init;
pub mod ls;
pub mod new;
pub mod projects;
pub mod pull;
pub mod push;
pub mod show;
pub mod stats;

use crate::config::{self, AppConfig, CliOverrides};
use crate::error::{JiloError, Result};
use crate::model::Issue;
use crate::storage::{IssueStore, SqliteStorage};
use std::io::IsTerminal;
use std::path::PathBuf;

/// An open workspace: discovered directory, loaded config, loaded store.
pub struct Context {
    pub dir: PathBuf,
    pub config: AppConfig,
    pub store: IssueStore,
    pub storage: SqliteStorage,
}

/// Open the workspace for a command.
///
/// # Errors
///
/// Returns [`JiloError::NotInitialized`] when no workspace is found, or any
/// config/cache loading error.
pub fn open_workspace(cli: &CliOverrides) -> Result<Context> {
    let dir = config::resolve_workspace(cli)?;
    let app_config = AppConfig::load(&dir)?;
    let storage = SqliteStorage::open(&config::cache_path(&dir))?;
    let store = IssueStore::from_issues(storage.load_all()?);
    Ok(Context {
        dir,
        config: app_config,
        store,
        storage,
    })
}

impl Context {
    /// Persist the in-memory store to the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache rewrite fails.
    pub fn persist(&mut self) -> Result<()> {
        self.storage.save_all(self.store.values())
    }

    /// Write the config back to the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_config(&self) -> Result<()> {
        self.config.write(&self.dir)
    }
}

/// Resolve an issue key: exact match first, then a unique prefix match
/// (temporary uuid keys are unwieldy to type in full; `new:` prefixes from
/// `jilo ls` output are accepted too).
///
/// # Errors
///
/// Returns an error when nothing matches or the prefix is ambiguous.
pub fn resolve_key(store: &IssueStore, search: &str) -> Result<String> {
    if store.contains(search) {
        return Ok(search.to_string());
    }

    let prefix = search.strip_prefix("new:").unwrap_or(search);
    let matches: Vec<&str> = store
        .values()
        .filter(|i| i.key.starts_with(prefix))
        .map(|i| i.key.as_str())
        .collect();

    match matches.as_slice() {
        [one] => Ok((*one).to_string()),
        [] => Err(JiloError::IssueNotFound {
            key: search.to_string(),
        }),
        _ => Err(JiloError::AmbiguousLinkedIssue {
            search: search.to_string(),
        }),
    }
}

/// Find a linkable issue by key, then epic name, then summary substring.
///
/// # Errors
///
/// Returns an error when nothing matches or more than one issue matches.
pub fn find_linked_issue<'a>(store: &'a IssueStore, search: &str) -> Result<&'a Issue> {
    if let Some(issue) = store.get(search) {
        return Ok(issue);
    }

    let by_epic_name: Vec<&Issue> = store
        .values()
        .filter(|i| i.epic_name.as_deref() == Some(search))
        .collect();
    match by_epic_name.as_slice() {
        [one] => return Ok(one),
        [] => {}
        _ => {
            return Err(JiloError::AmbiguousLinkedIssue {
                search: search.to_string(),
            });
        }
    }

    let by_summary: Vec<&Issue> = store
        .values()
        .filter(|i| i.summary.contains(search))
        .collect();
    match by_summary.as_slice() {
        [one] => Ok(one),
        [] => Err(JiloError::LinkedIssueNotFound {
            search: search.to_string(),
        }),
        _ => Err(JiloError::AmbiguousLinkedIssue {
            search: search.to_string(),
        }),
    }
}

/// Split a `field=value` pair from a `--set` flag.
///
/// # Errors
///
/// Returns an error when no `=` is present.
pub fn split_set_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| JiloError::Config(format!("bad --set value '{pair}', expected field=value")))
}

/// Whether to colorize stdout output.
#[must_use]
pub fn use_color(cli: &CliOverrides) -> bool {
    !cli.no_color && std::io::stdout().is_terminal()
}
