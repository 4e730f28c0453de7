//! Core data types for `jilo`.
//!
//! This module defines the issue record and its serialization:
//! - `Issue` - the ticket record, typed per the static field schema
//! - `FieldSpec` / `FIELD_SCHEMA` - the schema description driving
//!   serialization, diffing and user edits
//! - `patch` - structural diff/apply between current form and snapshot
//! - `value` - typed field values and parsing
//!
//! Every issue observed from the remote system carries a **snapshot**: its
//! serialized form exactly as last confirmed by the server. The patch
//! between the current form and the snapshot is what gets persisted, and
//! `modified` is computed from it on demand rather than tracked eagerly.

pub mod patch;
pub mod value;

pub use patch::{FieldMap, Patch, PatchOp};
pub use value::{FieldKind, Numeric};

use crate::error::{JiloError, Result};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use uuid::Uuid;

/// Dotted-path prefix for entries of the open extension map.
///
/// All `extended.<key>` addressing lives here; nothing else in the codebase
/// parses the prefix by hand.
pub const EXTENDED_PREFIX: &str = "extended.";

/// Schema description of one issue field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Server-owned. Rejected on user-edit paths, refreshed on pull.
    pub readonly: bool,
    /// Restore the snapshot value before applying an edit, so the field
    /// changes at most once per sync cycle.
    pub reset_before_edit: bool,
    /// Title used when rendering and when parsing editor output.
    pub friendly: &'static str,
}

/// The static issue schema. Extension-map entries are covered separately by
/// the `extended.` prefix convention and are always plain strings.
pub static FIELD_SCHEMA: &[FieldSpec] = &[
    FieldSpec { name: "key", kind: FieldKind::Str, readonly: true, reset_before_edit: false, friendly: "Key" },
    FieldSpec { name: "project_id", kind: FieldKind::Str, readonly: true, reset_before_edit: false, friendly: "Project ID" },
    FieldSpec { name: "id", kind: FieldKind::Int, readonly: true, reset_before_edit: false, friendly: "Id" },
    FieldSpec { name: "issuetype", kind: FieldKind::Str, readonly: true, reset_before_edit: false, friendly: "Type" },
    FieldSpec { name: "summary", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Summary" },
    FieldSpec { name: "assignee", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Assignee" },
    FieldSpec { name: "created", kind: FieldKind::Time, readonly: true, reset_before_edit: false, friendly: "Created" },
    FieldSpec { name: "creator", kind: FieldKind::Str, readonly: true, reset_before_edit: false, friendly: "Creator" },
    FieldSpec { name: "description", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Description" },
    FieldSpec { name: "fix_versions", kind: FieldKind::StrSet, readonly: false, reset_before_edit: false, friendly: "Fix Version" },
    FieldSpec { name: "components", kind: FieldKind::StrSet, readonly: false, reset_before_edit: false, friendly: "Components" },
    FieldSpec { name: "labels", kind: FieldKind::StrSet, readonly: false, reset_before_edit: false, friendly: "Labels" },
    FieldSpec { name: "priority", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Priority" },
    FieldSpec { name: "reporter", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Reporter" },
    FieldSpec { name: "status", kind: FieldKind::Str, readonly: true, reset_before_edit: false, friendly: "Status" },
    FieldSpec { name: "updated", kind: FieldKind::Time, readonly: true, reset_before_edit: false, friendly: "Updated" },
    FieldSpec { name: "epic_link", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Epic Ref" },
    FieldSpec { name: "epic_name", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Epic Short Name" },
    FieldSpec { name: "sprint", kind: FieldKind::StrSet, readonly: false, reset_before_edit: true, friendly: "Sprint" },
    FieldSpec { name: "story_points", kind: FieldKind::Number, readonly: false, reset_before_edit: false, friendly: "Story Points" },
    FieldSpec { name: "parent_link", kind: FieldKind::Str, readonly: false, reset_before_edit: false, friendly: "Parent Ref" },
];

/// Look up the schema entry for a field path.
///
/// `extended.<key>` paths resolve to a synthetic string spec.
#[must_use]
pub fn field_spec(path: &str) -> Option<&'static FieldSpec> {
    static EXTENDED_SPEC: FieldSpec = FieldSpec {
        name: "extended",
        kind: FieldKind::Str,
        readonly: false,
        reset_before_edit: false,
        friendly: "Extended",
    };
    if path.starts_with(EXTENDED_PREFIX) {
        return Some(&EXTENDED_SPEC);
    }
    FIELD_SCHEMA.iter().find(|f| f.name == path)
}

/// True if the path names a server-owned field.
#[must_use]
pub fn is_readonly(path: &str) -> bool {
    field_spec(path).is_some_and(|f| f.readonly)
}

/// The ticket record.
///
/// `snapshot` is private: it changes only through [`Issue::set_snapshot`]
/// (on pull/push confirmation) and never through user edits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Issue {
    pub project_id: String,
    pub key: String,
    pub issuetype: String,
    pub summary: String,
    pub assignee: Option<String>,
    pub created: Option<DateTime<FixedOffset>>,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub fix_versions: BTreeSet<String>,
    pub components: BTreeSet<String>,
    /// Numeric id assigned by the server. Present iff the record exists
    /// remotely.
    pub id: Option<i64>,
    pub labels: BTreeSet<String>,
    pub priority: Option<String>,
    pub reporter: Option<String>,
    pub status: Option<String>,
    pub updated: Option<DateTime<FixedOffset>>,
    pub epic_link: Option<String>,
    pub epic_name: Option<String>,
    pub sprint: BTreeSet<String>,
    pub story_points: Option<Numeric>,
    pub parent_link: Option<String>,
    /// Open-ended site-specific attributes, addressed as `extended.<key>`.
    pub extended: BTreeMap<String, String>,

    pub snapshot: Option<FieldMap>,
}

impl Issue {
    /// Create a brand-new local record with a temporary 36-char key and no
    /// snapshot. The record stays "new" (never "modified") until the server
    /// acknowledges it and assigns a permanent key.
    #[must_use]
    pub fn new_local(project_id: &str, issuetype: &str, summary: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            key: Uuid::new_v4().to_string(),
            issuetype: issuetype.to_string(),
            summary: summary.to_string(),
            ..Self::default()
        }
    }

    /// True once the remote system has assigned this record an id.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.id.is_some()
    }

    /// The last-confirmed remote form, if the record has been observed
    /// remotely.
    #[must_use]
    pub fn snapshot(&self) -> Option<&FieldMap> {
        self.snapshot.as_ref()
    }

    /// Replace the snapshot. Does not touch the current field values and
    /// therefore never marks the record modified by itself.
    pub fn set_snapshot(&mut self, snapshot: Option<FieldMap>) {
        self.snapshot = snapshot;
    }

    /// Serialize to the canonical flat form.
    ///
    /// Unset options, empty strings and empty sets are omitted; sets become
    /// sorted arrays; timestamps keep their UTC offset; extension entries
    /// appear under `extended.<key>`.
    #[must_use]
    pub fn to_map(&self) -> FieldMap {
        let mut map = FieldMap::new();

        let put_str = |map: &mut FieldMap, path: &str, v: Option<&str>| {
            if let Some(s) = v {
                if !s.is_empty() {
                    map.insert(path.to_string(), Value::String(s.to_string()));
                }
            }
        };

        put_str(&mut map, "key", Some(&self.key));
        put_str(&mut map, "project_id", Some(&self.project_id));
        put_str(&mut map, "issuetype", Some(&self.issuetype));
        put_str(&mut map, "summary", Some(&self.summary));
        put_str(&mut map, "assignee", self.assignee.as_deref());
        put_str(&mut map, "creator", self.creator.as_deref());
        put_str(&mut map, "description", self.description.as_deref());
        put_str(&mut map, "priority", self.priority.as_deref());
        put_str(&mut map, "reporter", self.reporter.as_deref());
        put_str(&mut map, "status", self.status.as_deref());
        put_str(&mut map, "epic_link", self.epic_link.as_deref());
        put_str(&mut map, "epic_name", self.epic_name.as_deref());
        put_str(&mut map, "parent_link", self.parent_link.as_deref());

        if let Some(id) = self.id {
            map.insert("id".to_string(), Value::from(id));
        }
        if let Some(ts) = &self.created {
            map.insert("created".to_string(), Value::String(ts.to_rfc3339()));
        }
        if let Some(ts) = &self.updated {
            map.insert("updated".to_string(), Value::String(ts.to_rfc3339()));
        }
        if let Some(points) = &self.story_points {
            map.insert(
                "story_points".to_string(),
                Value::String(points.to_string()),
            );
        }
        for (path, set) in [
            ("fix_versions", &self.fix_versions),
            ("components", &self.components),
            ("labels", &self.labels),
            ("sprint", &self.sprint),
        ] {
            if !set.is_empty() {
                map.insert(path.to_string(), value::set_to_value(set));
            }
        }
        for (k, v) in &self.extended {
            if !v.is_empty() {
                map.insert(format!("{EXTENDED_PREFIX}{k}"), Value::String(v.clone()));
            }
        }

        map
    }

    /// Deserialize from the canonical flat form.
    ///
    /// # Errors
    ///
    /// Returns an error when `key` is missing, a value does not match its
    /// schema kind, or an unknown field path is present (extension paths
    /// excepted).
    pub fn from_map(map: &FieldMap) -> Result<Self> {
        let key = map
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| JiloError::malformed("<unknown>", "missing field 'key'"))?
            .to_string();

        let mut issue = Self {
            key,
            ..Self::default()
        };

        for (path, raw) in map {
            if path == "key" {
                continue;
            }
            let spec = field_spec(path).ok_or_else(|| JiloError::UnknownField {
                field: path.clone(),
            })?;
            let canonical = spec.kind.parse_json(path, raw)?;
            issue.assign(path, Some(&canonical))?;
        }

        Ok(issue)
    }

    /// Structural diff of the current form against the snapshot.
    ///
    /// Records without a snapshot (never observed remotely) have no diff.
    #[must_use]
    pub fn diff(&self) -> Patch {
        self.snapshot
            .as_ref()
            .map(|snapshot| patch::diff(&self.to_map(), snapshot))
            .unwrap_or_default()
    }

    /// True iff the record exists remotely and at least one field differs
    /// from the snapshot.
    #[must_use]
    pub fn modified(&self) -> bool {
        self.snapshot.is_some() && !self.diff().is_empty()
    }

    /// Discard local modifications by restoring every field to its snapshot
    /// value. No-op for records without a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored snapshot no longer matches the schema.
    pub fn reset_to_snapshot(&mut self) -> Result<()> {
        if let Some(snapshot) = self.snapshot.clone() {
            let mut restored = Self::from_map(&snapshot)?;
            restored.snapshot = Some(snapshot);
            *self = restored;
        }
        Ok(())
    }

    /// Set one field from user-facing text. This is the "user edit" path:
    /// server-owned fields are rejected, empty text unsets the field, and
    /// set-typed fields are replaced wholesale (see [`Issue::add_to_set`]
    /// for incremental edits).
    ///
    /// # Errors
    ///
    /// Returns an error for unknown/readonly fields or unparseable text.
    pub fn set_field(&mut self, path: &str, raw: &str) -> Result<()> {
        let spec = self.writable_spec(path)?;
        self.apply_reset_before_edit(path, spec)?;

        if raw.trim().is_empty() {
            self.assign(path, None)
        } else {
            let canonical = spec.kind.parse_str(path, raw)?;
            self.assign(path, Some(&canonical))
        }
    }

    /// Add values to a set-typed field (comma-separated text).
    ///
    /// # Errors
    ///
    /// Returns an error for unknown/readonly/non-set fields.
    pub fn add_to_set(&mut self, path: &str, raw: &str) -> Result<()> {
        let spec = self.writable_spec(path)?;
        self.apply_reset_before_edit(path, spec)?;
        let set = self.set_field_mut(path, spec)?;
        set.extend(value::split_set_literal(raw));
        Ok(())
    }

    /// Remove values from a set-typed field (comma-separated text).
    ///
    /// # Errors
    ///
    /// Returns an error for unknown/readonly/non-set fields.
    pub fn remove_from_set(&mut self, path: &str, raw: &str) -> Result<()> {
        let spec = self.writable_spec(path)?;
        let set = self.set_field_mut(path, spec)?;
        for item in value::split_set_literal(raw) {
            set.remove(&item);
        }
        Ok(())
    }

    /// Set one field from a canonical JSON value, bypassing the readonly
    /// check. This is the generic patch operation used by merge and
    /// conflict resolution, which legitimately write server-owned fields.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields or values that do not match the
    /// schema kind.
    pub fn set_field_value(&mut self, path: &str, value: Option<&Value>) -> Result<()> {
        let spec = field_spec(path).ok_or_else(|| JiloError::UnknownField {
            field: path.to_string(),
        })?;
        match value {
            Some(v) if !v.is_null() => {
                let canonical = spec.kind.parse_json(path, v)?;
                self.assign(path, Some(&canonical))
            }
            _ => self.assign(path, None),
        }
    }

    /// Patch writable fields from a flat attribute map (the upsert path
    /// used by import and bulk edits). Server-owned fields and the key are
    /// skipped silently; unknown fields are errors.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields or values that do not match the
    /// schema kind.
    pub fn patch_from_map(&mut self, attrs: &FieldMap) -> Result<bool> {
        let mut patched = false;
        for (path, value) in attrs {
            if path == "key" {
                continue;
            }
            let spec = field_spec(path).ok_or_else(|| JiloError::UnknownField {
                field: path.clone(),
            })?;
            if spec.readonly {
                continue;
            }
            self.apply_reset_before_edit(path, spec)?;
            if value.is_null() {
                self.assign(path, None)?;
            } else {
                let canonical = spec.kind.parse_json(path, value)?;
                self.assign(path, Some(&canonical))?;
            }
            patched = true;
        }
        Ok(patched)
    }

    fn writable_spec(&self, path: &str) -> Result<&'static FieldSpec> {
        let spec = field_spec(path).ok_or_else(|| JiloError::UnknownField {
            field: path.to_string(),
        })?;
        if spec.readonly {
            return Err(JiloError::ReadOnlyField {
                field: path.to_string(),
            });
        }
        Ok(spec)
    }

    /// One-shot fields revert to their snapshot value before each edit, so
    /// only a single change per sync cycle reaches the server.
    fn apply_reset_before_edit(&mut self, path: &str, spec: &FieldSpec) -> Result<()> {
        if !spec.reset_before_edit {
            return Ok(());
        }
        let snapshot_value = self
            .snapshot
            .as_ref()
            .and_then(|snap| snap.get(path).cloned());
        self.set_field_value(path, snapshot_value.as_ref())
    }

    fn set_field_mut(&mut self, path: &str, spec: &FieldSpec) -> Result<&mut BTreeSet<String>> {
        if spec.kind != FieldKind::StrSet {
            return Err(JiloError::deserialize(path, "not a set-typed field"));
        }
        Ok(match path {
            "fix_versions" => &mut self.fix_versions,
            "components" => &mut self.components,
            "labels" => &mut self.labels,
            "sprint" => &mut self.sprint,
            _ => unreachable!("schema marks only set fields as StrSet"),
        })
    }

    /// Write a canonical (already validated) value into the typed field.
    /// `None` unsets.
    fn assign(&mut self, path: &str, value: Option<&Value>) -> Result<()> {
        if let Some(ext_key) = path.strip_prefix(EXTENDED_PREFIX) {
            match value.and_then(Value::as_str) {
                Some(s) if !s.is_empty() => {
                    self.extended.insert(ext_key.to_string(), s.to_string());
                }
                _ => {
                    self.extended.remove(ext_key);
                }
            }
            return Ok(());
        }

        let as_string = |v: Option<&Value>| {
            v.and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        match path {
            "key" => {
                if let Some(s) = as_string(value) {
                    self.key = s;
                }
            }
            "project_id" => self.project_id = as_string(value).unwrap_or_default(),
            "issuetype" => self.issuetype = as_string(value).unwrap_or_default(),
            "summary" => self.summary = as_string(value).unwrap_or_default(),
            "assignee" => self.assignee = as_string(value),
            "creator" => self.creator = as_string(value),
            "description" => self.description = as_string(value),
            "priority" => self.priority = as_string(value),
            "reporter" => self.reporter = as_string(value),
            "status" => self.status = as_string(value),
            "epic_link" => self.epic_link = as_string(value),
            "epic_name" => self.epic_name = as_string(value),
            "parent_link" => self.parent_link = as_string(value),
            "id" => self.id = value.and_then(Value::as_i64),
            "created" | "updated" => {
                let ts = match value.and_then(Value::as_str) {
                    Some(s) => Some(value::parse_timestamp(path, s)?),
                    None => None,
                };
                if path == "created" {
                    self.created = ts;
                } else {
                    self.updated = ts;
                }
            }
            "story_points" => {
                self.story_points = match value.and_then(Value::as_str) {
                    Some(s) => Some(Numeric::from_str(s)?),
                    None => None,
                };
            }
            "fix_versions" | "components" | "labels" | "sprint" => {
                let set = value.map(value::value_to_set).unwrap_or_default();
                match path {
                    "fix_versions" => self.fix_versions = set,
                    "components" => self.components = set,
                    "labels" => self.labels = set,
                    _ => self.sprint = set,
                }
            }
            other => {
                return Err(JiloError::UnknownField {
                    field: other.to_string(),
                });
            }
        }
        Ok(())
    }
}
