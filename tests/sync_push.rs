//! Push-cycle orchestration tests with a fake transport and real `SQLite`.

mod common;

use common::{FakeTransport, ScriptedSurface, api_issue, cached_issue, project};
use jilo::config::AppConfig;
use jilo::model::Issue;
use jilo::storage::{IssueStore, SqliteStorage};
use jilo::sync::Syncer;
use serde_json::json;

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
fn push_submits_only_the_modified_field_subset() {
    let mut harness = Harness::new();
    let meta = project();
    let mut local = cached_issue(&meta, "PROJ-1", 1);
    local.set_field("assignee", "bob").unwrap();
    harness.store.upsert(local);

    let transport = FakeTransport::new();
    transport.serve(api_issue("PROJ-1", 1, json!({})));
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).push().unwrap();
    assert_eq!(outcome.pushed, 1);
    assert_eq!(outcome.total, 1);
    assert!(outcome.complete());

    let updated = transport.updated.borrow();
    let payload = updated.get("PROJ-1").unwrap();
    assert_eq!(payload.len(), 1);
    assert_eq!(payload.get("assignee"), Some(&json!({ "name": "bob" })));

    // the push confirmed the new remote state: no longer modified
    assert!(!harness.store.get("PROJ-1").unwrap().modified());
}

#[test]
fn push_new_record_rekeys_store_and_repoints_links() {
    let mut harness = Harness::new();
    let meta = project();

    let epic = Issue::new_local(&meta.id(), "Epic", "Big theme");
    let temp_key = epic.key.clone();
    assert_eq!(temp_key.len(), 36);

    let mut child = Issue::new_local(&meta.id(), "Story", "Child work");
    child.set_field("epic_link", &temp_key).unwrap();
    let child_temp_key = child.key.clone();

    harness.store.upsert(epic);
    harness.store.upsert(child);

    let transport = FakeTransport::new();
    transport
        .next_keys
        .borrow_mut()
        .extend(["PROJ-42".to_string(), "PROJ-43".to_string()]);
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).push().unwrap();
    assert_eq!(outcome.pushed, 2);

    // the epic is retrievable under the server key, not the temp key
    assert!(harness.store.get(&temp_key).is_none());
    let epic = harness.store.get("PROJ-42").unwrap();
    assert!(epic.exists());
    assert!(epic.snapshot().is_some());

    // the child (pushed after, as a non-epic) pointed at the temp key and
    // now points at the server key
    assert!(harness.store.get(&child_temp_key).is_none());
    let created = transport.created.borrow();
    assert_eq!(created.len(), 2);
    // epics are pushed before other new issues
    assert_eq!(
        created[0].get("issuetype"),
        Some(&json!({ "name": "Epic" }))
    );
}

#[test]
fn push_new_record_sends_full_writable_set() {
    let mut harness = Harness::new();
    let meta = project();
    let mut issue = Issue::new_local(&meta.id(), "Story", "Fresh one");
    issue.set_field("assignee", "dave").unwrap();
    issue.set_field("labels", "a,b").unwrap();
    harness.store.upsert(issue);

    let transport = FakeTransport::new();
    let surface = ScriptedSurface::unused();
    harness.syncer(&transport, &surface).push().unwrap();

    let created = transport.created.borrow();
    let payload = &created[0];
    assert_eq!(payload.get("summary"), Some(&json!("Fresh one")));
    assert_eq!(payload.get("assignee"), Some(&json!({ "name": "dave" })));
    assert_eq!(payload.get("labels"), Some(&json!(["a", "b"])));
    assert_eq!(payload.get("project"), Some(&json!({ "key": "PROJ" })));
    assert!(!payload.contains_key("status"));
}

#[test]
fn push_catches_last_second_remote_changes() {
    let mut harness = Harness::new();
    let meta = project();
    let mut local = cached_issue(&meta, "PROJ-1", 1);
    local.set_field("assignee", "bob").unwrap();
    harness.store.upsert(local);

    // the remote moved on since our snapshot: conflicting assignee
    let transport = FakeTransport::new();
    transport.serve(api_issue(
        "PROJ-1",
        1,
        json!({ "assignee": { "name": "carol" } }),
    ));
    // keep our local value in the editor round trip
    let surface = ScriptedSurface::new(vec![Some("Assignee  bob\n".to_string())]);

    let outcome = harness.syncer(&transport, &surface).push().unwrap();
    assert_eq!(outcome.pushed, 1);
    assert_eq!(surface.calls.get(), 1);

    let updated = transport.updated.borrow();
    let payload = updated.get("PROJ-1").unwrap();
    assert_eq!(payload.get("assignee"), Some(&json!({ "name": "bob" })));
}

#[test]
fn failed_pushes_are_skipped_and_counted() {
    let mut harness = Harness::new();
    let meta = project();

    let mut bad = cached_issue(&meta, "PROJ-1", 1);
    bad.set_field("assignee", "bob").unwrap();
    let mut good = cached_issue(&meta, "PROJ-2", 2);
    good.set_field("assignee", "eve").unwrap();
    harness.store.upsert(bad);
    harness.store.upsert(good);

    let transport = FakeTransport::new();
    transport.serve(api_issue("PROJ-1", 1, json!({})));
    transport.serve(api_issue("PROJ-2", 2, json!({})));
    transport.fail_update.borrow_mut().insert("PROJ-1".to_string());
    let surface = ScriptedSurface::unused();

    let outcome = harness.syncer(&transport, &surface).push().unwrap();
    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.pushed, 1);
    assert!(!outcome.complete());

    // the failed record keeps its offline modification for the next pass
    assert!(harness.store.get("PROJ-1").unwrap().modified());
    assert!(!harness.store.get("PROJ-2").unwrap().modified());
}

#[test]
fn push_with_nothing_to_do_reports_zero_of_zero() {
    let mut harness = Harness::new();
    let meta = project();
    harness.store.upsert(cached_issue(&meta, "PROJ-1", 1));

    let transport = FakeTransport::new();
    let surface = ScriptedSurface::unused();
    let outcome = harness.syncer(&transport, &surface).push().unwrap();

    assert_eq!(outcome.total, 0);
    assert!(outcome.complete());
}
