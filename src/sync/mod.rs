//! Pull & push orchestration.
//!
//! One invocation performs one pull or one push pass to completion,
//! sequentially: pages are fetched in order, each page is persisted before
//! the next is fetched, and a project's watermark only advances after its
//! whole batch succeeded. Per-record failures (malformed data, resolution
//! exhaustion, rejected pushes) are logged with the record key and skipped;
//! they never abort the pass.

use crate::config::AppConfig;
use crate::config::ProjectMeta;
use crate::error::{JiloError, Result};
use crate::merge;
use crate::merge::resolution::{ResolutionSurface, resolve_conflicts};
use crate::model::Issue;
use crate::remote::{ProjectDetails, Transport, convert};
use crate::storage::{IssueStore, SqliteStorage};
use crate::util::progress::{create_progress_bar, should_show_progress};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Watermark used when a project has never completed a pull.
const EPOCH_START: &str = "2010-01-01 00:00";
/// Format of the watermark written after a successful pull.
const WATERMARK_FORMAT: &str = "%Y-%m-%d %H:%M";
/// Attempts for project-metadata fetches before the project is failed.
const META_ATTEMPTS: usize = 3;
const BACKOFF_BASE_MS: u64 = 500;

/// Everything a sync pass needs, passed in explicitly.
pub struct Syncer<'a> {
    pub dir: &'a Path,
    pub config: &'a mut AppConfig,
    pub store: &'a mut IssueStore,
    pub storage: &'a mut SqliteStorage,
    pub transport: &'a dyn Transport,
    pub surface: &'a dyn ResolutionSurface,
}

/// Counters reported after a pull pass.
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PullOutcome {
    pub fetched: usize,
    pub merged: usize,
    pub skipped: usize,
    /// Projects whose metadata or page fetches failed entirely.
    pub failed_projects: Vec<String>,
}

/// Counters reported after a push pass.
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PushOutcome {
    pub pushed: usize,
    pub total: usize,
}

impl PushOutcome {
    #[must_use]
    pub const fn complete(&self) -> bool {
        self.pushed == self.total
    }
}

enum Absorbed {
    Inserted,
    Merged,
}

impl Syncer<'_> {
    /// Pull changed records for the selected projects (all configured
    /// projects when `projects` is `None`).
    ///
    /// # Errors
    ///
    /// Returns an error when nothing is configured or a selected project is
    /// unknown. Failures within one project are reported in the outcome and
    /// do not stop the other projects.
    pub fn pull(&mut self, projects: Option<&BTreeSet<String>>, force: bool) -> Result<PullOutcome> {
        let ids = self.select_projects(projects)?;
        let mut outcome = PullOutcome::default();

        for project_id in ids {
            let project = self.config.projects[&project_id].clone();

            // project metadata defines how records are created and
            // converted, so refresh it on every pull
            let transport = self.transport;
            let details = with_retries(META_ATTEMPTS, || transport.get_project_details(&project));
            match details {
                Ok(details) => {
                    apply_details(
                        self.config
                            .projects
                            .get_mut(&project_id)
                            .expect("selected project exists"),
                        details,
                    );
                }
                Err(e) => {
                    let failed = JiloError::FailedPullingProjectMeta {
                        key: project.key.clone(),
                        reason: e.to_string(),
                    };
                    error!("{failed}");
                    outcome.failed_projects.push(project.key.clone());
                    continue;
                }
            }

            if let Err(e) = self.pull_single_project(&project_id, force, &mut outcome) {
                error!(project = %project.key, "pull failed: {e}");
                outcome.failed_projects.push(project.key.clone());
            }
        }

        Ok(outcome)
    }

    /// Push local changes: modified existing records first, then new epics,
    /// then the remaining new records. Always reports "pushed N of M".
    ///
    /// # Errors
    ///
    /// Returns an error when nothing is configured or persistence fails;
    /// per-record push failures only lower the reported count.
    pub fn push(&mut self) -> Result<PushOutcome> {
        if self.config.projects.is_empty() {
            return Err(JiloError::NoProjectsConfigured);
        }

        let keys = push_order(self.store);
        let total = keys.len();
        let pbar = create_progress_bar(total as u64, "Pushing issues", should_show_progress());

        let mut pushed = 0;
        for key in keys {
            match self.push_one(&key) {
                Ok(()) => pushed += 1,
                Err(e) => error!(key = %key, "push failed: {e}"),
            }
            pbar.inc(1);
        }
        pbar.finish_and_clear();

        self.storage.save_all(self.store.values())?;

        let outcome = PushOutcome { pushed, total };
        if outcome.complete() {
            info!("Pushed {pushed} of {total} issues");
        } else {
            error!("Pushed {pushed} of {total} issues");
        }
        Ok(outcome)
    }

    /// Discard offline modifications by resetting every snapshot-carrying
    /// record to its snapshot. Never-pushed records are kept as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot fails schema validation or
    /// persistence fails.
    pub fn reset_local_modifications(&mut self) -> Result<usize> {
        let mut reset = 0;
        for issue in self.store.values_mut() {
            if issue.modified() {
                issue.reset_to_snapshot()?;
                reset += 1;
            }
        }
        self.storage.save_all(self.store.values())?;
        Ok(reset)
    }

    fn select_projects(&self, projects: Option<&BTreeSet<String>>) -> Result<Vec<String>> {
        if self.config.projects.is_empty() {
            return Err(JiloError::NoProjectsConfigured);
        }
        let Some(keys) = projects else {
            return Ok(self.config.projects.keys().cloned().collect());
        };

        let mut ids = Vec::new();
        for key in keys {
            let project = self
                .config
                .find_project(key)
                .ok_or_else(|| JiloError::ProjectNotConfigured { key: key.clone() })?;
            ids.push(project.id());
        }
        Ok(ids)
    }

    fn pull_single_project(
        &mut self,
        project_id: &str,
        force: bool,
        outcome: &mut PullOutcome,
    ) -> Result<()> {
        let project = self.config.projects[project_id].clone();

        let since = if force {
            EPOCH_START.to_string()
        } else {
            project
                .last_updated
                .clone()
                .unwrap_or_else(|| EPOCH_START.to_string())
        };
        info!(
            project = %project.project_uri(),
            since = %since,
            "querying for updated issues"
        );

        // one cheap probe for the total count, to size the progress bar
        let probe = self.transport.fetch_updated(&project, Some(&since), 0, 1)?;
        let pbar = create_progress_bar(
            probe.total as u64,
            &format!("Pulling {}", project.key),
            should_show_progress(),
        );

        let page_size = self.config.sync.page_size.max(1);
        let mut start_at = 0;
        loop {
            let page = self
                .transport
                .fetch_updated(&project, Some(&since), start_at, page_size)?;
            if page.issues.is_empty() {
                break;
            }
            let count = page.issues.len();

            for api_issue in &page.issues {
                match self.absorb_remote(&project, api_issue) {
                    Ok(Absorbed::Inserted) => outcome.fetched += 1,
                    Ok(Absorbed::Merged) => {
                        outcome.fetched += 1;
                        outcome.merged += 1;
                    }
                    Err(e) => {
                        let key = api_issue
                            .get("key")
                            .and_then(Value::as_str)
                            .unwrap_or("<unknown>");
                        warn!(key, "skipping record: {e}");
                        outcome.skipped += 1;
                    }
                }
                pbar.inc(1);
            }

            // persist this page before fetching the next one
            self.storage.save_all(self.store.values())?;
            start_at += count;
            if count < page_size {
                break;
            }
        }
        pbar.finish_and_clear();

        // the whole batch succeeded: advance the watermark
        let project = self
            .config
            .projects
            .get_mut(project_id)
            .expect("selected project exists");
        project.last_updated = Some(chrono::Local::now().format(WATERMARK_FORMAT).to_string());
        self.config.write(self.dir)?;
        Ok(())
    }

    /// Take one fetched record into the local store, merging when the local
    /// copy has offline modifications.
    fn absorb_remote(&mut self, project: &ProjectMeta, api_issue: &Value) -> Result<Absorbed> {
        let mut fetched = convert::api_object_to_issue(project, api_issue)?;
        fetched.set_snapshot(Some(fetched.to_map()));
        let key = fetched.key.clone();

        let needs_merge = self.store.get(&key).is_some_and(Issue::modified);
        if !needs_merge {
            self.store.upsert(fetched);
            return Ok(Absorbed::Inserted);
        }

        let local = self.store.get(&key).expect("checked above");
        let result = merge::merge_issues(local, Some(&fetched), true);
        let issue = if result.has_conflicts() {
            resolve_conflicts(&result, self.surface)?
        } else {
            result.draft.into_issue()?
        };
        self.store.upsert(issue);
        Ok(Absorbed::Merged)
    }

    fn push_one(&mut self, key: &str) -> Result<()> {
        let local = self
            .store
            .get(key)
            .ok_or_else(|| JiloError::IssueNotFound {
                key: key.to_string(),
            })?
            .clone();
        let project = self
            .config
            .projects
            .get(&local.project_id)
            .ok_or_else(|| JiloError::ProjectNotConfigured {
                key: local.project_id.clone(),
            })?
            .clone();

        if local.exists() {
            self.push_existing(&project, &local)
        } else {
            self.push_new(&project, &local)
        }
    }

    /// Update an existing record, re-fetching the remote state first to
    /// catch last-second changes.
    fn push_existing(&mut self, project: &ProjectMeta, local: &Issue) -> Result<()> {
        let api_obj = self.transport.fetch_issue(project, &local.key)?;
        let mut remote = convert::api_object_to_issue(project, &api_obj)?;
        remote.set_snapshot(Some(remote.to_map()));

        let result = merge::merge_issues(local, Some(&remote), true);
        let modified = result.modified.clone();
        let mut issue = if result.has_conflicts() {
            resolve_conflicts(&result, self.surface)?
        } else {
            result.draft.into_issue()?
        };

        if issue.diff().is_empty() {
            // the remote side already matches; nothing to submit
            self.store.upsert(issue);
            return Ok(());
        }

        let payload = convert::issue_to_api_fields(project, &issue, Some(&modified));
        self.transport.update_issue(project, &issue.key, &payload)?;

        // the server now matches local: confirm the snapshot
        issue.set_snapshot(Some(issue.to_map()));
        info!(key = %issue.key, issuetype = %issue.issuetype, "updated issue");
        self.store.upsert(issue);
        Ok(())
    }

    /// Create a new record, then re-key the store from the temporary key to
    /// the server-assigned one.
    fn push_new(&mut self, project: &ProjectMeta, local: &Issue) -> Result<()> {
        let payload = convert::issue_to_api_fields(project, local, None);
        let new_key = self.transport.create_issue(project, &payload)?;

        // retrieve the freshly minted record, server-owned fields included
        let api_obj = self.transport.fetch_issue(project, &new_key)?;
        let mut acknowledged = convert::api_object_to_issue(project, &api_obj)?;
        acknowledged.set_snapshot(Some(acknowledged.to_map()));

        info!(key = %new_key, issuetype = %acknowledged.issuetype, "created new issue");
        self.store.rekey(&local.key, acknowledged);
        Ok(())
    }
}

/// Push order: existing records with local changes, then new epics, then
/// all other new records (children may link to epics created moments
/// earlier).
#[must_use]
pub fn push_order(store: &IssueStore) -> Vec<String> {
    let mut keys: Vec<String> = store
        .values()
        .filter(|i| i.exists() && i.modified())
        .map(|i| i.key.clone())
        .collect();
    keys.extend(
        store
            .values()
            .filter(|i| !i.exists() && i.issuetype == "Epic")
            .map(|i| i.key.clone()),
    );
    keys.extend(
        store
            .values()
            .filter(|i| !i.exists() && i.issuetype != "Epic")
            .map(|i| i.key.clone()),
    );
    keys
}

/// Fold freshly fetched project metadata into the configured project.
pub fn apply_details(project: &mut ProjectMeta, details: ProjectDetails) {
    if details.name.is_some() {
        project.name = details.name;
    }
    project.issuetypes = details.issuetypes;
    project.priorities = details.priorities;
    project.components = details.components;

    let custom = &mut project.customfields;
    let incoming = details.customfields;
    for (slot, value) in [
        (&mut custom.epic_link, incoming.epic_link),
        (&mut custom.epic_name, incoming.epic_name),
        (&mut custom.sprint, incoming.sprint),
        (&mut custom.story_points, incoming.story_points),
        (&mut custom.parent_link, incoming.parent_link),
    ] {
        if value.is_some() {
            *slot = value;
        }
    }
    // user-configured extension mappings are never clobbered by createmeta
}

/// Run `op` up to `attempts` times with exponential backoff between tries.
fn with_retries<T>(attempts: usize, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut delay = Duration::from_millis(BACKOFF_BASE_MS);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, max = attempts, "attempt failed: {e}");
                last_err = Some(e);
                if attempt < attempts {
                    thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt"))
}
