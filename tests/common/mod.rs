//! Shared fixtures for integration tests: a fake transport, a scripted
//! resolution surface, and issue/project builders. No network, no mocks of
//! the storage layer (tests run against real in-memory `SQLite`).
#![allow(dead_code)]

use jilo::config::ProjectMeta;
use jilo::error::{JiloError, Result};
use jilo::merge::resolution::ResolutionSurface;
use jilo::model::Issue;
use jilo::remote::{ProjectDetails, SearchPage, Transport};
use serde_json::{Map, Value, json};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

/// The test project everything hangs off.
pub fn project() -> ProjectMeta {
    let mut project = ProjectMeta::factory("https://jira.example.com/PROJ").unwrap();
    project.username = Some("tester".to_string());
    project
}

/// Build a raw API issue object the way the server would return it.
pub fn api_issue(key: &str, id: i64, extra_fields: Value) -> Value {
    let mut fields = json!({
        "summary": format!("Summary of {key}"),
        "issuetype": { "name": "Story" },
        "status": { "name": "Open" },
        "creator": { "name": "carol" },
        "created": "2024-01-01T09:00:00.000+0000",
        "updated": "2024-01-02T09:00:00.000+0000"
    });
    if let (Some(base), Some(extra)) = (fields.as_object_mut(), extra_fields.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    json!({ "key": key, "id": id.to_string(), "fields": fields })
}

/// A cached issue that exists remotely, snapshot set to its own form.
pub fn cached_issue(project: &ProjectMeta, key: &str, id: i64) -> Issue {
    let mut issue = Issue {
        project_id: project.id(),
        key: key.to_string(),
        issuetype: "Story".to_string(),
        summary: format!("Summary of {key}"),
        status: Some("Open".to_string()),
        id: Some(id),
        ..Issue::default()
    };
    let map = issue.to_map();
    issue.set_snapshot(Some(map));
    issue
}

/// In-memory transport double: a mutable remote issue table plus failure
/// switches and a record of every write that reached "the server".
#[derive(Default)]
pub struct FakeTransport {
    /// key -> raw API object served by search/fetch.
    pub remote_issues: RefCell<BTreeMap<String, Value>>,
    /// Keys handed out by create_issue, in order.
    pub next_keys: RefCell<Vec<String>>,
    /// Payloads accepted by create_issue.
    pub created: RefCell<Vec<Map<String, Value>>>,
    /// key -> payload accepted by update_issue.
    pub updated: RefCell<BTreeMap<String, Map<String, Value>>>,
    /// Fail every metadata call.
    pub fail_meta: Cell<bool>,
    /// Keys whose update_issue calls are rejected.
    pub fail_update: RefCell<BTreeSet<String>>,
    next_id: Cell<i64>,
}

impl FakeTransport {
    pub fn new() -> Self {
        let transport = Self::default();
        transport.next_id.set(9000);
        transport
    }

    pub fn serve(&self, api_object: Value) {
        let key = api_object["key"].as_str().unwrap().to_string();
        self.remote_issues.borrow_mut().insert(key, api_object);
    }
}

impl Transport for FakeTransport {
    fn get_project_details(&self, _project: &ProjectMeta) -> Result<ProjectDetails> {
        if self.fail_meta.get() {
            return Err(JiloError::TransportUnavailable("meta down".to_string()));
        }
        Ok(ProjectDetails {
            name: Some("Test Project".to_string()),
            issuetypes: ["Story", "Epic", "Bug"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            priorities: ["High", "Low"].iter().map(ToString::to_string).collect(),
            components: BTreeSet::new(),
            customfields: jilo::config::CustomFieldMap::default(),
        })
    }

    fn fetch_updated(
        &self,
        _project: &ProjectMeta,
        _since: Option<&str>,
        start_at: usize,
        max_results: usize,
    ) -> Result<SearchPage> {
        let issues: Vec<Value> = self.remote_issues.borrow().values().cloned().collect();
        let total = issues.len();
        let page = issues
            .into_iter()
            .skip(start_at)
            .take(max_results)
            .collect();
        Ok(SearchPage {
            issues: page,
            total,
        })
    }

    fn fetch_issue(&self, _project: &ProjectMeta, key: &str) -> Result<Value> {
        self.remote_issues
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| JiloError::ApiError {
                status: 404,
                message: format!("issue {key} not found"),
            })
    }

    fn create_issue(&self, _project: &ProjectMeta, fields: &Map<String, Value>) -> Result<String> {
        let mut next_keys = self.next_keys.borrow_mut();
        let key = if next_keys.is_empty() {
            format!("PROJ-{}", self.next_id.get())
        } else {
            next_keys.remove(0)
        };
        drop(next_keys);
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.created.borrow_mut().push(fields.clone());

        // synthesize what the server would now return for this record
        let summary = fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("created")
            .to_string();
        let issuetype = fields
            .get("issuetype")
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("Story")
            .to_string();
        let mut api_object = api_issue(&key, id, json!({ "summary": summary }));
        api_object["fields"]["issuetype"] = json!({ "name": issuetype });
        if let Some(assignee) = fields.get("assignee") {
            api_object["fields"]["assignee"] = assignee.clone();
        }
        self.serve(api_object);
        Ok(key)
    }

    fn update_issue(
        &self,
        _project: &ProjectMeta,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<()> {
        if self.fail_update.borrow().contains(key) {
            return Err(JiloError::ApiError {
                status: 500,
                message: format!("update of {key} rejected"),
            });
        }
        self.updated
            .borrow_mut()
            .insert(key.to_string(), fields.clone());
        Ok(())
    }
}

/// Resolution surface returning a scripted sequence of editor results.
pub struct ScriptedSurface {
    responses: RefCell<Vec<Option<String>>>,
    pub calls: Cell<usize>,
}

impl ScriptedSurface {
    pub fn new(responses: Vec<Option<String>>) -> Self {
        Self {
            responses: RefCell::new(responses),
            calls: Cell::new(0),
        }
    }

    /// A surface that must never be consulted.
    pub fn unused() -> Self {
        Self::new(Vec::new())
    }
}

impl ResolutionSurface for ScriptedSurface {
    fn edit(&self, _text: &str) -> Result<Option<String>> {
        self.calls.set(self.calls.get() + 1);
        let mut responses = self.responses.borrow_mut();
        assert!(
            !responses.is_empty(),
            "resolution surface consulted more times than scripted"
        );
        Ok(responses.remove(0))
    }
}
