//! Three-way merge engine.
//!
//! There are three versions of a record at merge time:
//!
//! - **origin**: the base record's snapshot, as last confirmed remotely
//! - **base**: the local record, possibly modified offline
//! - **incoming**: the other side (a freshly fetched remote record, or
//!   nothing at all for a record that only exists locally)
//!
//! Both sides are diffed against the origin. A field touched by one side
//! only takes that side's value. A field changed by both sides to the same
//! value is not a conflict. A field changed by both sides to different
//! values is a conflict: it is reported in the conflict map and marked in
//! the merged draft with a distinguished marker until resolution.
//!
//! ```text
//!      incoming --- merged
//!      /           /
//!   origin ----- base
//! ```
//!
//! Server-owned (readonly) fields never participate in conflict detection;
//! when the incoming side is a real remote record, the merged draft adopts
//! its readonly values wholesale.

pub mod resolution;

use crate::error::{JiloError, Result};
use crate::model::{FIELD_SCHEMA, FieldMap, Issue, is_readonly};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// The three values in play for one conflicted field.
///
/// `original` is the snapshot value, `updated` the incoming value, `base`
/// the local value. JSON null stands for "absent on that side".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictValues {
    pub original: Value,
    pub updated: Value,
    pub base: Value,
}

/// One entry of a merged draft: a real field value, or the conflict marker.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftValue {
    Value(Value),
    /// Not a real field value. Must be replaced before the draft can become
    /// an [`Issue`].
    Conflict,
}

/// The merged record while conflicts may still be pending.
#[derive(Debug, Clone)]
pub struct Draft {
    key: String,
    fields: BTreeMap<String, DraftValue>,
    snapshot: Option<FieldMap>,
}

impl Draft {
    /// Key of the record being merged.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&DraftValue> {
        self.fields.get(path)
    }

    /// All field paths present on the draft.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Field paths still carrying the conflict marker.
    #[must_use]
    pub fn conflicted_paths(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, v)| **v == DraftValue::Conflict)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Replace a field (typically a conflict marker) with a resolved value.
    /// `None` unsets the field.
    pub fn resolve_field(&mut self, path: &str, value: Option<Value>) {
        match value {
            Some(v) => {
                self.fields.insert(path.to_string(), DraftValue::Value(v));
            }
            None => {
                self.fields.remove(path);
            }
        }
    }

    /// Convert the draft into a typed [`Issue`], carrying the snapshot
    /// over and recomputing the patch implicitly.
    ///
    /// # Errors
    ///
    /// Returns [`JiloError::UnresolvedConflicts`] when any marker remains,
    /// or a deserialization error if a field no longer matches the schema.
    pub fn into_issue(self) -> Result<Issue> {
        let pending = self.conflicted_paths();
        if !pending.is_empty() {
            return Err(JiloError::UnresolvedConflicts {
                key: self.key,
                fields: pending,
            });
        }

        let map: FieldMap = self
            .fields
            .into_iter()
            .map(|(path, v)| match v {
                DraftValue::Value(value) => (path, value),
                DraftValue::Conflict => unreachable!("checked above"),
            })
            .collect();

        let mut issue = Issue::from_map(&map)?;
        issue.set_snapshot(self.snapshot);
        Ok(issue)
    }
}

/// Result of one merge operation: the merged draft, the union of fields
/// touched on either side, and the conflict map.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub draft: Draft,
    pub modified: BTreeSet<String>,
    pub conflicts: BTreeMap<String, ConflictValues>,
}

impl MergeResult {
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Merge `base` against `incoming`, updating the draft's snapshot when the
/// incoming record is the authoritative remote state (`upstream`), so that
/// future diffs are computed against the newly confirmed form.
#[must_use]
pub fn merge_issues(base: &Issue, incoming: Option<&Issue>, upstream: bool) -> MergeResult {
    let mut result = build_update(base, incoming);
    if upstream {
        if let Some(inc) = incoming {
            result.draft.snapshot = Some(inc.to_map());
        }
    }
    result
}

/// Compute the three-way merge of `base` against `incoming`.
///
/// With `incoming == None` (a record that only exists locally) the
/// comparison degenerates: every writable field set on `base` is a pending
/// addition and no conflict is possible.
#[must_use]
pub fn build_update(base: &Issue, incoming: Option<&Issue>) -> MergeResult {
    let base_map = base.to_map();

    let Some(inc) = incoming else {
        let modified = base_map
            .keys()
            .filter(|path| !is_readonly(path))
            .cloned()
            .collect();
        let fields = base_map
            .into_iter()
            .map(|(path, v)| (path, DraftValue::Value(v)))
            .collect();
        return MergeResult {
            draft: Draft {
                key: base.key.clone(),
                fields,
                snapshot: base.snapshot().cloned(),
            },
            modified,
            conflicts: BTreeMap::new(),
        };
    };

    let origin = base.snapshot().cloned().unwrap_or_default();
    let inc_map = inc.to_map();

    let changed_base = touched_paths(&origin, &base_map);
    let changed_inc = touched_paths(&origin, &inc_map);
    let modified: BTreeSet<String> = changed_base.union(&changed_inc).cloned().collect();

    let mut fields: BTreeMap<String, DraftValue> = base_map
        .iter()
        .map(|(path, v)| (path.clone(), DraftValue::Value(v.clone())))
        .collect();
    let mut conflicts = BTreeMap::new();

    for path in &modified {
        let base_value = base_map.get(path);
        let inc_value = inc_map.get(path);

        match (changed_base.contains(path), changed_inc.contains(path)) {
            (true, true) if base_value == inc_value => {
                // both sides made the same change
            }
            (true, true) => {
                conflicts.insert(
                    path.clone(),
                    ConflictValues {
                        original: origin.get(path).cloned().unwrap_or(Value::Null),
                        updated: inc_value.cloned().unwrap_or(Value::Null),
                        base: base_value.cloned().unwrap_or(Value::Null),
                    },
                );
                fields.insert(path.clone(), DraftValue::Conflict);
            }
            (false, true) => match inc_value {
                Some(v) => {
                    fields.insert(path.clone(), DraftValue::Value(v.clone()));
                }
                None => {
                    fields.remove(path);
                }
            },
            _ => {
                // local-only change (or untouched): base already in place
            }
        }
    }

    // server-owned fields come from the authoritative incoming record
    for spec in FIELD_SCHEMA.iter().filter(|f| f.readonly) {
        match inc_map.get(spec.name) {
            Some(v) => {
                fields.insert(spec.name.to_string(), DraftValue::Value(v.clone()));
            }
            None => {
                fields.remove(spec.name);
            }
        }
    }

    MergeResult {
        draft: Draft {
            key: base.key.clone(),
            fields,
            snapshot: base.snapshot().cloned(),
        },
        modified,
        conflicts,
    }
}

/// Paths whose value differs between `origin` and `side`, skipping
/// server-owned fields.
fn touched_paths(origin: &FieldMap, side: &FieldMap) -> BTreeSet<String> {
    let mut touched = BTreeSet::new();
    for path in origin.keys().chain(side.keys()) {
        if is_readonly(path) || touched.contains(path) {
            continue;
        }
        if origin.get(path) != side.get(path) {
            touched.insert(path.clone());
        }
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshotted(assignee: &str, summary: &str) -> Issue {
        let mut issue = Issue {
            project_id: "p1".to_string(),
            key: "PROJ-1".to_string(),
            issuetype: "Story".to_string(),
            summary: summary.to_string(),
            assignee: Some(assignee.to_string()),
            id: Some(10001),
            ..Issue::default()
        };
        let map = issue.to_map();
        issue.set_snapshot(Some(map));
        issue
    }

    #[test]
    fn local_change_remote_unchanged_takes_local() {
        let mut local = snapshotted("alice", "S");
        local.set_field("assignee", "bob").unwrap();
        let remote = snapshotted("alice", "S");

        let result = merge_issues(&local, Some(&remote), true);
        assert!(result.conflicts.is_empty());
        assert_eq!(
            result.modified,
            std::iter::once("assignee".to_string()).collect()
        );

        let merged = result.draft.into_issue().unwrap();
        assert_eq!(merged.assignee.as_deref(), Some("bob"));
    }

    #[test]
    fn remote_change_local_unchanged_takes_remote() {
        let local = snapshotted("alice", "S");
        let mut remote = snapshotted("alice", "S");
        remote.summary = "S (revised)".to_string();

        let result = merge_issues(&local, Some(&remote), true);
        assert!(result.conflicts.is_empty());
        let merged = result.draft.into_issue().unwrap();
        assert_eq!(merged.summary, "S (revised)");
    }

    #[test]
    fn competing_changes_conflict_with_three_values() {
        let mut local = snapshotted("alice", "S");
        local.set_field("assignee", "bob").unwrap();
        let mut remote = snapshotted("alice", "S");
        remote.assignee = Some("carol".to_string());

        let result = merge_issues(&local, Some(&remote), true);
        assert_eq!(
            result.conflicts.get("assignee"),
            Some(&ConflictValues {
                original: json!("alice"),
                updated: json!("carol"),
                base: json!("bob"),
            })
        );
        assert_eq!(
            result.draft.get("assignee"),
            Some(&DraftValue::Conflict)
        );
        // an unresolved draft refuses to become an issue
        let err = result.draft.into_issue().unwrap_err();
        assert!(matches!(err, JiloError::UnresolvedConflicts { .. }));
    }

    #[test]
    fn identical_changes_on_both_sides_are_not_conflicts() {
        let mut local = snapshotted("alice", "S");
        local.set_field("assignee", "dave").unwrap();
        let mut remote = snapshotted("alice", "S");
        remote.assignee = Some("dave".to_string());

        let result = merge_issues(&local, Some(&remote), true);
        assert!(result.conflicts.is_empty());
        assert!(result.modified.contains("assignee"));
        let merged = result.draft.into_issue().unwrap();
        assert_eq!(merged.assignee.as_deref(), Some("dave"));
    }

    #[test]
    fn extended_entries_conflict_under_dotted_path() {
        let mut local = snapshotted("alice", "S");
        local.set_field("extended.team", "infra").unwrap();
        let mut remote = snapshotted("alice", "S");
        remote
            .extended
            .insert("team".to_string(), "platform".to_string());

        let result = merge_issues(&local, Some(&remote), true);
        let conflict = result.conflicts.get("extended.team").unwrap();
        assert_eq!(conflict.original, Value::Null);
        assert_eq!(conflict.updated, json!("platform"));
        assert_eq!(conflict.base, json!("infra"));
        // only the entry is marked, not the whole extension map
        assert_eq!(result.draft.get("extended.team"), Some(&DraftValue::Conflict));
    }

    #[test]
    fn blank_incoming_never_conflicts() {
        let mut issue = Issue::new_local("p1", "Story", "Brand new");
        issue.set_field("assignee", "bob").unwrap();
        issue.set_field("labels", "fresh").unwrap();

        let result = merge_issues(&issue, None, false);
        assert!(result.conflicts.is_empty());
        let expected: BTreeSet<String> = ["assignee", "labels", "summary"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(result.modified, expected);
    }

    #[test]
    fn upstream_merge_refreshes_snapshot_and_readonly_fields() {
        let mut local = snapshotted("alice", "S");
        local.set_field("assignee", "bob").unwrap();
        let mut remote = snapshotted("alice", "S");
        remote.status = Some("Done".to_string());
        remote.updated =
            Some(chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z").unwrap());

        let result = merge_issues(&local, Some(&remote), true);
        // server-owned changes are adopted without appearing as conflicts
        assert!(result.conflicts.is_empty());
        assert!(!result.modified.contains("status"));

        let merged = result.draft.into_issue().unwrap();
        assert_eq!(merged.status.as_deref(), Some("Done"));
        assert_eq!(merged.snapshot(), Some(&remote.to_map()));
        // only the local edit remains pending after the snapshot refresh
        let diff = merged.diff();
        let paths: Vec<&str> = diff.iter().map(crate::model::PatchOp::path).collect();
        assert_eq!(paths, vec!["assignee"]);
    }

    #[test]
    fn remerge_against_same_remote_state_is_noop() {
        let local = snapshotted("alice", "S");
        let remote = snapshotted("alice", "S");

        let result = merge_issues(&local, Some(&remote), true);
        assert!(result.modified.is_empty());
        assert!(result.conflicts.is_empty());
        let merged = result.draft.into_issue().unwrap();
        assert!(merged.diff().is_empty());
    }
}
