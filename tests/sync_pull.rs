//! Pull-cycle orchestration tests with a fake transport and real `SQLite`.

mod common;

use common::{FakeTransport, ScriptedSurface, api_issue, cached_issue, project};
use jilo::config::AppConfig;
use jilo::storage::{IssueStore, SqliteStorage};
use jilo::sync::Syncer;
use serde_json::json;
use std::collections::BTreeSet;

struct Harness {
    dir: tempfile::TempDir,
    config: AppConfig,
    store: IssueStore,
    storage: SqliteStorage,
}

impl Harness {
    fn new() -> Self {
        let project = project();
        let mut config = AppConfig::default();
        config.projects.insert(project.id(), project);
        Self {
            dir: tempfile::tempdir().unwrap(),
            config,
            store: IssueStore::new(),
            storage: SqliteStorage::open_memory().unwrap(),
        }
    }

    fn syncer<'a>(
        &'a mut self,
        transport: &'a FakeTransport,
        surface: &'a ScriptedSurface,
    ) -> Syncer<'a> {
        Syncer {
            dir: self.dir.path(),
            config: &mut self.config,
            store: &mut self.store,
            storage: &mut self.storage,
            transport,
            surface,
        }
    }
}

#[test]
fn pull_inserts_unseen_records_and_advances_watermark() {
    let mut harness = Harness::new();
    let transport = FakeTransport::new();
    transport.serve(api_issue("PROJ-1", 1, json!({})));
    transport.serve(api_issue("PROJ-2", 2, json!({ "assignee": { "name": "alice" } })));
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).pull(None, false).unwrap();

    assert_eq!(outcome.fetched, 2);
    assert_eq!(outcome.merged, 0);
    assert_eq!(outcome.skipped, 0);
    assert!(outcome.failed_projects.is_empty());

    let issue = harness.store.get("PROJ-2").unwrap();
    assert_eq!(issue.assignee.as_deref(), Some("alice"));
    assert!(!issue.modified());
    assert!(issue.snapshot().is_some());

    // watermark advanced and persisted
    let project = harness.config.projects.values().next().unwrap();
    assert!(project.last_updated.is_some());
    let reloaded = AppConfig::load(harness.dir.path()).unwrap();
    assert_eq!(
        reloaded.projects.values().next().unwrap().last_updated,
        project.last_updated
    );

    // the batch reached the cache
    assert_eq!(harness.storage.load_all().unwrap().len(), 2);
}

#[test]
fn pull_merges_locally_modified_records() {
    let mut harness = Harness::new();
    let meta = project();
    let mut local = cached_issue(&meta, "PROJ-1", 1);
    local.set_field("assignee", "bob").unwrap();
    harness.store.upsert(local);

    // remote is unchanged from the snapshot
    let transport = FakeTransport::new();
    transport.serve(api_issue("PROJ-1", 1, json!({})));
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).pull(None, false).unwrap();
    assert_eq!(outcome.merged, 1);

    // the local edit survived the merge and is still pending push
    let issue = harness.store.get("PROJ-1").unwrap();
    assert_eq!(issue.assignee.as_deref(), Some("bob"));
    assert!(issue.modified());
}

#[test]
fn pull_resolves_conflicts_through_the_surface() {
    let mut harness = Harness::new();
    let meta = project();
    let mut local = cached_issue(&meta, "PROJ-1", 1);
    local.set_field("assignee", "bob").unwrap();
    harness.store.upsert(local);

    let transport = FakeTransport::new();
    transport.serve(api_issue(
        "PROJ-1",
        1,
        json!({ "assignee": { "name": "carol" } }),
    ));
    let surface = ScriptedSurface::new(vec![Some("Assignee  carol\n".to_string())]);

    let outcome = harness.syncer(&transport, &surface).pull(None, false).unwrap();
    assert_eq!(outcome.merged, 1);
    assert_eq!(surface.calls.get(), 1);

    let issue = harness.store.get("PROJ-1").unwrap();
    assert_eq!(issue.assignee.as_deref(), Some("carol"));
    // user took the remote side: nothing left to push
    assert!(!issue.modified());
}

#[test]
fn pull_skips_record_when_resolution_exhausts_retries() {
    let mut harness = Harness::new();
    let meta = project();
    let mut local = cached_issue(&meta, "PROJ-1", 1);
    local.set_field("assignee", "bob").unwrap();
    harness.store.upsert(local);

    let transport = FakeTransport::new();
    transport.serve(api_issue(
        "PROJ-1",
        1,
        json!({ "assignee": { "name": "carol" } }),
    ));
    // three aborted editor sessions exhaust the retry bound
    let surface = ScriptedSurface::new(vec![None, None, None]);

    let outcome = harness.syncer(&transport, &surface).pull(None, false).unwrap();
    assert_eq!(outcome.skipped, 1);

    // the half-resolved record was not persisted: local state is intact
    let issue = harness.store.get("PROJ-1").unwrap();
    assert_eq!(issue.assignee.as_deref(), Some("bob"));
    assert!(issue.modified());
}

#[test]
fn pull_skips_malformed_records_and_continues() {
    let mut harness = Harness::new();
    let transport = FakeTransport::new();
    transport.serve(api_issue("PROJ-1", 1, json!({})));
    // no "fields" at all: a data error for this record only
    transport.serve(json!({ "key": "PROJ-BAD" }));
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).pull(None, false).unwrap();

    assert_eq!(outcome.fetched, 1);
    assert_eq!(outcome.skipped, 1);
    assert!(harness.store.get("PROJ-1").is_some());
    assert!(harness.store.get("PROJ-BAD").is_none());
}

#[test]
fn pull_reports_project_as_failed_when_metadata_is_down() {
    let mut harness = Harness::new();
    let transport = FakeTransport::new();
    transport.fail_meta.set(true);
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).pull(None, false).unwrap();
    assert_eq!(outcome.failed_projects, vec!["PROJ".to_string()]);
    assert_eq!(outcome.fetched, 0);

    // the watermark must not move for a failed project
    let project = harness.config.projects.values().next().unwrap();
    assert!(project.last_updated.is_none());
}

#[test]
fn pull_unknown_project_filter_is_an_error() {
    let mut harness = Harness::new();
    let transport = FakeTransport::new();
    let surface = ScriptedSurface::unused();

    let filter: BTreeSet<String> = std::iter::once("NOPE".to_string()).collect();
    let err = harness
        .syncer(&transport, &surface)
        .pull(Some(&filter), false)
        .unwrap_err();
    assert!(matches!(
        err,
        jilo::JiloError::ProjectNotConfigured { ref key } if key == "NOPE"
    ));
}

#[test]
fn pull_pages_are_processed_in_order() {
    let mut harness = Harness::new();
    harness.config.sync.page_size = 2;

    let transport = FakeTransport::new();
    for n in 1..=5 {
        transport.serve(api_issue(&format!("PROJ-{n}"), n, json!({})));
    }
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).pull(None, false).unwrap();
    assert_eq!(outcome.fetched, 5);
    assert_eq!(harness.store.len(), 5);
}

#[test]
fn reset_hard_discards_offline_modifications() {
    let mut harness = Harness::new();
    let meta = project();
    let mut local = cached_issue(&meta, "PROJ-1", 1);
    local.set_field("assignee", "bob").unwrap();
    harness.store.upsert(local);

    let transport = FakeTransport::new();
    let surface = ScriptedSurface::unused();
    let reset = harness
        .syncer(&transport, &surface)
        .reset_local_modifications()
        .unwrap();

    assert_eq!(reset, 1);
    let issue = harness.store.get("PROJ-1").unwrap();
    assert!(!issue.modified());
    assert_eq!(issue.assignee, None);
}
