//! Structural diff and patch over serialized records.
//!
//! A [`Patch`] is the ordered list of elementary changes between a record's
//! current serialized form and its snapshot (the form last confirmed by the
//! remote system). Patches are persisted alongside the current form so the
//! snapshot can be rebuilt after a process restart: `revert` walks the patch
//! backwards from the current form.
//!
//! Laws (covered by unit and property tests):
//! - `apply(snapshot, diff(current, snapshot)) == current`
//! - `revert(current, diff(current, snapshot)) == snapshot`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat serialized form of a record: field path -> canonical JSON value.
///
/// Extension-map entries appear under dotted `extended.<key>` paths, so one
/// level of nesting is enough for every field the schema knows about.
pub type FieldMap = BTreeMap<String, Value>;

/// One elementary change between a snapshot and a current form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Field present now, absent in the snapshot.
    Add { path: String, value: Value },
    /// Field absent now, present in the snapshot.
    Remove { path: String, value: Value },
    /// Field present on both sides with different values.
    Change { path: String, old: Value, new: Value },
}

impl PatchOp {
    /// The field path this operation touches.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Remove { path, .. } | Self::Change { path, .. } => path,
        }
    }
}

/// An ordered list of [`PatchOp`], sorted by field path.
pub type Patch = Vec<PatchOp>;

/// Compute the structural difference `snapshot -> current`.
#[must_use]
pub fn diff(current: &FieldMap, snapshot: &FieldMap) -> Patch {
    let mut ops = Vec::new();

    for (path, value) in current {
        match snapshot.get(path) {
            None => ops.push(PatchOp::Add {
                path: path.clone(),
                value: value.clone(),
            }),
            Some(old) if old != value => ops.push(PatchOp::Change {
                path: path.clone(),
                old: old.clone(),
                new: value.clone(),
            }),
            Some(_) => {}
        }
    }

    for (path, value) in snapshot {
        if !current.contains_key(path) {
            ops.push(PatchOp::Remove {
                path: path.clone(),
                value: value.clone(),
            });
        }
    }

    ops.sort_by(|a, b| a.path().cmp(b.path()));
    ops
}

/// Apply a patch recorded against `snapshot`, reconstructing the current form.
#[must_use]
pub fn apply(snapshot: &FieldMap, patch: &[PatchOp]) -> FieldMap {
    let mut out = snapshot.clone();
    for op in patch {
        match op {
            PatchOp::Add { path, value } | PatchOp::Change { path, new: value, .. } => {
                out.insert(path.clone(), value.clone());
            }
            PatchOp::Remove { path, .. } => {
                out.remove(path);
            }
        }
    }
    out
}

/// Walk a patch backwards from the current form, reconstructing the snapshot.
#[must_use]
pub fn revert(current: &FieldMap, patch: &[PatchOp]) -> FieldMap {
    let mut out = current.clone();
    for op in patch {
        match op {
            PatchOp::Add { path, .. } => {
                out.remove(path);
            }
            PatchOp::Remove { path, value } | PatchOp::Change { path, old: value, .. } => {
                out.insert(path.clone(), value.clone());
            }
        }
    }
    out
}
