//! Conversion between raw API objects and [`Issue`] records.
//!
//! `api_object_to_issue` turns the server's JSON into a typed record (with
//! the custom-field mapping applied), and `issue_to_api_fields` builds the
//! JSON payload for create/update calls, restricted to the modified-field
//! subset on updates.

use crate::config::ProjectMeta;
use crate::error::{JiloError, Result};
use crate::model::{FieldMap, Issue, is_readonly};
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Parse a timestamp as the remote API renders it.
///
/// Accepts RFC3339 and the compact-offset variant (`+0200`, with optional
/// fractional seconds) some servers produce.
///
/// # Errors
///
/// Returns a deserialization error naming the field.
pub fn parse_api_timestamp(field: &str, s: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts);
    }
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .map_err(|e| JiloError::deserialize(field, format!("bad timestamp '{s}': {e}")))
}

fn name_of(value: Option<&Value>) -> Option<String> {
    let obj = value?;
    obj.get("name")
        .or_else(|| obj.get("displayName"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn names_of(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.get("name").and_then(Value::as_str))
        .map(|s| Value::String(s.to_string()))
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert a raw API issue object into a typed record.
///
/// The returned issue has no snapshot; callers set it from this same
/// object's serialized form when the fetch is authoritative.
///
/// # Errors
///
/// Returns [`JiloError::MalformedRecord`] when mandatory parts are missing
/// or a field fails schema validation, with the record key for context.
pub fn api_object_to_issue(project: &ProjectMeta, data: &Value) -> Result<Issue> {
    let key = data
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| JiloError::malformed("<unknown>", "missing 'key'"))?;
    let fields = data
        .get("fields")
        .and_then(Value::as_object)
        .ok_or_else(|| JiloError::malformed(key, "missing 'fields'"))?;

    let mut map = FieldMap::new();
    let mut put = |path: &str, value: Option<Value>| {
        if let Some(v) = value {
            if !v.is_null() {
                map.insert(path.to_string(), v);
            }
        }
    };

    put("key", Some(Value::String(key.to_string())));
    put("project_id", Some(Value::String(project.id())));
    put("id", data.get("id").cloned());

    for ts_field in ["created", "updated"] {
        if let Some(raw) = fields.get(ts_field).and_then(Value::as_str) {
            let ts = parse_api_timestamp(ts_field, raw)
                .map_err(|e| JiloError::malformed(key, e.to_string()))?;
            put(ts_field, Some(Value::String(ts.to_rfc3339())));
        }
    }

    put(
        "issuetype",
        name_of(fields.get("issuetype")).map(Value::String),
    );
    put("status", name_of(fields.get("status")).map(Value::String));
    put(
        "priority",
        name_of(fields.get("priority")).map(Value::String),
    );
    put("creator", name_of(fields.get("creator")).map(Value::String));
    put(
        "assignee",
        name_of(fields.get("assignee")).map(Value::String),
    );
    put(
        "reporter",
        name_of(fields.get("reporter")).map(Value::String),
    );
    put("summary", fields.get("summary").cloned());
    put("description", fields.get("description").cloned());
    put("labels", fields.get("labels").cloned());
    put(
        "fix_versions",
        Some(Value::Array(names_of(fields.get("fixVersions")))),
    );
    put(
        "components",
        Some(Value::Array(names_of(fields.get("components")))),
    );

    for (path, customfield) in project.customfields.iter() {
        let Some(raw) = fields.get(customfield) else {
            continue;
        };
        if raw.is_null() {
            continue;
        }
        let value = match path.as_str() {
            "sprint" => match raw {
                Value::Array(_) => Some(raw.clone()),
                other => scalar_to_string(other).map(|s| Value::Array(vec![Value::String(s)])),
            },
            "story_points" => Some(raw.clone()),
            _ => scalar_to_string(raw).map(Value::String),
        };
        if let Some(v) = value {
            map.insert(path.clone(), v);
        }
    }

    // drop empty arrays the canonical form omits
    map.retain(|_, v| !matches!(v, Value::Array(items) if items.is_empty()));

    Issue::from_map(&map).map_err(|e| JiloError::malformed(key, e.to_string()))
}

/// Build the API fields payload for a record.
///
/// With `modified` set, only those field paths are included (the update
/// path); paths in `modified` that are locally unset are sent as JSON null
/// so the server clears them. Without `modified` (the create path), every
/// writable field present on the record is included, plus the mandatory
/// issue type, summary and project reference.
#[must_use]
pub fn issue_to_api_fields(
    project: &ProjectMeta,
    issue: &Issue,
    modified: Option<&BTreeSet<String>>,
) -> Map<String, Value> {
    let map = issue.to_map();
    let customfield_ids: BTreeMap<String, String> = project
        .customfields
        .iter()
        .map(|(path, id)| (path, id.to_string()))
        .collect();

    let paths: Vec<String> = match modified {
        Some(modified) => modified
            .iter()
            .filter(|p| !is_readonly(p))
            .cloned()
            .collect(),
        None => {
            let mut paths: Vec<String> = map
                .keys()
                .filter(|p| !is_readonly(p))
                .cloned()
                .collect();
            paths.push("issuetype".to_string());
            paths
        }
    };

    let mut out = Map::new();
    for path in paths {
        let api_key = customfield_ids.get(&path).cloned().unwrap_or_else(|| {
            if path == "fix_versions" {
                "fixVersions".to_string()
            } else {
                path.clone()
            }
        });

        let value = map.get(&path).cloned().unwrap_or(Value::Null);
        let value = match path.as_str() {
            "issuetype" | "assignee" | "reporter" | "priority" => {
                if value.is_null() {
                    Value::Null
                } else {
                    json!({ "name": value })
                }
            }
            "story_points" => value
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
                .unwrap_or(Value::Null),
            _ => value,
        };
        out.insert(api_key, value);
    }

    if modified.is_none() {
        out.insert("project".to_string(), json!({ "key": project.key }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn project() -> ProjectMeta {
        let mut project = ProjectMeta::factory("https://jira.example.com/PROJ").unwrap();
        project.customfields.epic_link = Some("customfield_10100".to_string());
        project.customfields.story_points = Some("customfield_10101".to_string());
        project
            .customfields
            .extended
            .insert("team".to_string(), "customfield_10200".to_string());
        project
    }

    fn api_object() -> Value {
        json!({
            "key": "PROJ-1",
            "id": "10001",
            "fields": {
                "summary": "Remote summary",
                "description": "Body",
                "created": "2024-03-01T10:00:00.000+0200",
                "updated": "2024-03-02T11:30:00.000+0200",
                "creator": { "name": "carol" },
                "assignee": { "name": "alice" },
                "reporter": null,
                "status": { "name": "In Progress" },
                "priority": { "name": "High" },
                "issuetype": { "name": "Story" },
                "labels": ["backend"],
                "fixVersions": [{ "name": "1.0" }],
                "components": [],
                "customfield_10100": "PROJ-100",
                "customfield_10101": 3.5,
                "customfield_10200": "platform"
            }
        })
    }

    #[test]
    fn api_object_converts_to_issue() {
        let issue = api_object_to_issue(&project(), &api_object()).unwrap();
        assert_eq!(issue.key, "PROJ-1");
        assert_eq!(issue.id, Some(10001));
        assert_eq!(issue.summary, "Remote summary");
        assert_eq!(issue.assignee.as_deref(), Some("alice"));
        assert_eq!(issue.status.as_deref(), Some("In Progress"));
        assert_eq!(issue.epic_link.as_deref(), Some("PROJ-100"));
        assert_eq!(issue.story_points.as_ref().unwrap().as_str(), "3.5");
        assert_eq!(issue.extended.get("team").map(String::as_str), Some("platform"));
        assert!(issue.fix_versions.contains("1.0"));
        assert!(issue.components.is_empty());
        // compact offset is normalized to RFC3339 with the offset preserved
        assert_eq!(
            issue.created.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+02:00"
        );
    }

    #[test]
    fn api_object_without_key_is_malformed() {
        let err = api_object_to_issue(&project(), &json!({ "fields": {} })).unwrap_err();
        assert!(matches!(err, JiloError::MalformedRecord { .. }));
    }

    #[test]
    fn update_payload_contains_only_modified_fields() {
        let issue = api_object_to_issue(&project(), &api_object()).unwrap();
        let modified: BTreeSet<String> = ["assignee", "story_points"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let payload = issue_to_api_fields(&project(), &issue, Some(&modified));
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("assignee"), Some(&json!({ "name": "alice" })));
        assert_eq!(payload.get("customfield_10101"), Some(&json!(3.5)));
    }

    #[test]
    fn cleared_modified_field_is_sent_as_null() {
        let mut issue = api_object_to_issue(&project(), &api_object()).unwrap();
        issue.assignee = None;
        let modified: BTreeSet<String> =
            std::iter::once("assignee".to_string()).collect();

        let payload = issue_to_api_fields(&project(), &issue, Some(&modified));
        assert_eq!(payload.get("assignee"), Some(&Value::Null));
    }

    #[test]
    fn create_payload_has_full_writable_set() {
        let mut issue = Issue::new_local(&project().id(), "Story", "Fresh one");
        issue.set_field("assignee", "bob").unwrap();
        issue.story_points = Some(crate::model::Numeric::from_str("2").unwrap());

        let payload = issue_to_api_fields(&project(), &issue, None);
        assert_eq!(payload.get("summary"), Some(&json!("Fresh one")));
        assert_eq!(payload.get("issuetype"), Some(&json!({ "name": "Story" })));
        assert_eq!(payload.get("project"), Some(&json!({ "key": "PROJ" })));
        assert_eq!(payload.get("assignee"), Some(&json!({ "name": "bob" })));
        assert_eq!(payload.get("customfield_10101"), Some(&json!(2.0)));
        // server-owned fields never appear
        assert!(!payload.contains_key("status"));
        assert!(!payload.contains_key("key"));
    }
}
