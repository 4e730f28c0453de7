//! Interactive conflict resolution.
//!
//! A merge with conflicts is rendered as a text document with git-style
//! conflict blocks, handed to the resolution surface (normally `$EDITOR`),
//! and the edited text is parsed back. The user's chosen values are applied
//! to exactly the conflicted fields; everything else keeps its merged value.
//! Unusable editor output is retried up to [`MAX_ATTEMPTS`] times before the
//! whole resolution fails for that record.

use crate::error::{JiloError, Result};
use crate::format::{render_value, tabulate};
use crate::merge::{DraftValue, MergeResult};
use crate::model::{EXTENDED_PREFIX, FIELD_SCHEMA, field_spec};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Write;
use std::process::Command;
use tracing::{debug, error};

/// Bound on editor round trips before resolution fails.
pub const MAX_ATTEMPTS: usize = 3;

static MARKER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(<<|==|>>)").expect("valid regex"));

/// Where conflict documents go to be edited.
///
/// Returns the edited text, or `None` when the user aborted or made no
/// changes.
pub trait ResolutionSurface {
    /// # Errors
    ///
    /// Returns an error when the surface itself fails (editor could not be
    /// spawned, temp file unwritable).
    fn edit(&self, text: &str) -> Result<Option<String>>;
}

/// `$VISUAL` / `$EDITOR` round trip through a temp file (fallback `vi`).
pub struct EditorSurface;

impl ResolutionSurface for EditorSurface {
    fn edit(&self, text: &str) -> Result<Option<String>> {
        let editor = std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .unwrap_or_else(|_| "vi".to_string());

        let mut file = tempfile::Builder::new()
            .prefix("jilo-conflict-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(text.as_bytes())?;
        file.flush()?;

        let mut parts = editor.split_whitespace();
        let program = parts.next().unwrap_or("vi");
        let status = Command::new(program)
            .args(parts)
            .arg(file.path())
            .status()?;
        if !status.success() {
            return Ok(None);
        }

        let edited = std::fs::read_to_string(file.path())?;
        if edited == text {
            return Ok(None);
        }
        Ok(Some(edited))
    }
}

/// Drive the resolution surface until the merge has no pending conflicts.
///
/// # Errors
///
/// Returns [`JiloError::ConflictResolutionFailed`] after [`MAX_ATTEMPTS`]
/// unusable editor round trips, or any error from the surface itself.
pub fn resolve_conflicts(result: &MergeResult, surface: &dyn ResolutionSurface) -> Result<crate::model::Issue> {
    let document = render_conflict_document(result);

    for attempt in 1..=MAX_ATTEMPTS {
        match attempt_resolution(result, surface, &document) {
            Ok(issue) => return Ok(issue),
            Err(e @ (JiloError::EditorParse { .. } | JiloError::Deserialize { .. })) => {
                error!(
                    key = result.draft.key(),
                    attempt,
                    max = MAX_ATTEMPTS,
                    "failed parsing the return from conflict resolution: {e}"
                );
            }
            Err(other) => return Err(other),
        }
    }

    Err(JiloError::ConflictResolutionFailed {
        key: result.draft.key().to_string(),
    })
}

fn attempt_resolution(
    result: &MergeResult,
    surface: &dyn ResolutionSurface,
    document: &str,
) -> Result<crate::model::Issue> {
    let edited = surface.edit(document)?.ok_or_else(|| JiloError::EditorParse {
        reason: "no changes returned from editor".to_string(),
    })?;
    if edited.trim().is_empty() {
        return Err(JiloError::EditorParse {
            reason: "editor returned empty text".to_string(),
        });
    }
    if edited.lines().any(|l| MARKER_LINE.is_match(l)) {
        return Err(JiloError::EditorParse {
            reason: "conflict markers left in text".to_string(),
        });
    }

    let chosen = parse_editor_result(result, &edited)?;

    let mut draft = result.draft.clone();
    for (path, raw) in chosen {
        let spec = field_spec(&path).ok_or_else(|| JiloError::UnknownField {
            field: path.clone(),
        })?;
        let value = if raw.trim().is_empty() {
            None
        } else {
            Some(spec.kind.parse_str(&path, &raw)?)
        };
        draft.resolve_field(&path, value);
    }
    debug!(key = result.draft.key(), "conflicts resolved via editor");
    draft.into_issue()
}

/// Render the merged draft with git-style conflict blocks.
#[must_use]
pub fn render_conflict_document(result: &MergeResult) -> String {
    let key = result.draft.key();
    let mut rows: Vec<(String, String)> = Vec::new();

    for (path, title) in document_fields(result) {
        if let Some(conflict) = result.conflicts.get(&path) {
            rows.push(("<<<<<<< base".to_string(), String::new()));
            rows.push((title.clone(), render_value(&conflict.base)));
            rows.push(("=======".to_string(), String::new()));
            rows.push((title.clone(), render_value(&conflict.updated)));
            rows.push((">>>>>>> updated".to_string(), String::new()));
            continue;
        }
        if let Some(DraftValue::Value(v)) = result.draft.get(&path) {
            let mut rendered = render_value(v);
            if path == "summary" {
                rendered = format!("[{key}] {rendered}");
            }
            rows.push((title, rendered));
        }
    }

    format!("# Conflict(s) on issue {key}\n\n{}", tabulate(&rows))
}

/// Parse the text returned by the editor, extracting the value of every
/// conflicted field.
///
/// # Errors
///
/// Returns [`JiloError::EditorParse`] when a conflicted field is missing
/// from the document.
fn parse_editor_result(result: &MergeResult, edited: &str) -> Result<BTreeMap<String, String>> {
    // longest titles first so e.g. "Epic Short Name" wins over shorter ones
    let mut titles: Vec<(String, String)> = document_fields(result)
        .into_iter()
        .map(|(path, title)| (title, path))
        .collect();
    titles.sort_by_key(|(title, _)| std::cmp::Reverse(title.len()));

    let key = result.draft.key();
    let summary_prefix = format!("[{key}]");

    let mut chosen: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in edited.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            current = None;
            continue;
        }

        let matched = titles.iter().find(|(title, _)| {
            line == title || line.starts_with(&format!("{title} "))
        });

        if let Some((title, path)) = matched {
            current = None;
            if !result.conflicts.contains_key(path) {
                continue;
            }
            let mut value = line[title.len()..].trim().to_string();
            if path == "summary" {
                if let Some(stripped) = value.strip_prefix(&summary_prefix) {
                    value = stripped.trim().to_string();
                }
            }
            chosen.insert(path.clone(), value);
            current = Some(path.clone());
        } else if let Some(path) = &current {
            // continuation line of a multi-line value
            let entry = chosen.entry(path.clone()).or_default();
            entry.push('\n');
            entry.push_str(line.trim());
        }
    }

    for path in result.conflicts.keys() {
        if !chosen.contains_key(path) {
            return Err(JiloError::EditorParse {
                reason: format!("conflicted field '{path}' missing from edited text"),
            });
        }
    }
    Ok(chosen)
}

/// Ordered (path, title) pairs making up the conflict document. Identity
/// fields are skipped; extension entries come last under their dotted path.
fn document_fields(result: &MergeResult) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for spec in FIELD_SCHEMA {
        if matches!(spec.name, "key" | "project_id" | "id") {
            continue;
        }
        let present = result.draft.get(spec.name).is_some()
            || result.conflicts.contains_key(spec.name);
        if present {
            fields.push((spec.name.to_string(), spec.friendly.to_string()));
        }
    }

    let mut extended: Vec<String> = result
        .draft
        .paths()
        .map(String::from)
        .chain(result.conflicts.keys().cloned())
        .filter(|p| p.starts_with(EXTENDED_PREFIX))
        .collect();
    extended.sort();
    extended.dedup();
    for path in extended {
        fields.push((path.clone(), path));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge_issues;
    use crate::model::Issue;
    use std::cell::RefCell;

    /// Surface returning a scripted sequence of responses.
    struct Scripted {
        responses: RefCell<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Option<String>>) -> Self {
            Self {
                responses: RefCell::new(responses),
            }
        }
    }

    impl ResolutionSurface for Scripted {
        fn edit(&self, _text: &str) -> Result<Option<String>> {
            Ok(self.responses.borrow_mut().remove(0))
        }
    }

    fn conflicted_merge() -> MergeResult {
        let mut local = Issue {
            project_id: "p1".to_string(),
            key: "PROJ-1".to_string(),
            issuetype: "Story".to_string(),
            summary: "S".to_string(),
            assignee: Some("alice".to_string()),
            id: Some(10001),
            ..Issue::default()
        };
        let map = local.to_map();
        local.set_snapshot(Some(map));
        local.set_field("assignee", "bob").unwrap();

        let mut remote = local.clone();
        remote.reset_to_snapshot().unwrap();
        remote.assignee = Some("carol".to_string());

        merge_issues(&local, Some(&remote), true)
    }

    #[test]
    fn document_contains_conflict_block() {
        let result = conflicted_merge();
        let doc = render_conflict_document(&result);
        assert!(doc.starts_with("# Conflict(s) on issue PROJ-1"));
        assert!(doc.contains("<<<<<<< base"));
        assert!(doc.contains(">>>>>>> updated"));
        assert!(doc.contains("bob"));
        assert!(doc.contains("carol"));
    }

    #[test]
    fn resolution_applies_chosen_value() {
        let result = conflicted_merge();
        let edited = "Summary  [PROJ-1] S\nAssignee  carol\n";
        let surface = Scripted::new(vec![Some(edited.to_string())]);

        let issue = resolve_conflicts(&result, &surface).unwrap();
        assert_eq!(issue.assignee.as_deref(), Some("carol"));
        // non-conflicted fields keep their merged values
        assert_eq!(issue.summary, "S");
    }

    #[test]
    fn leftover_markers_are_retried_then_fail() {
        let result = conflicted_merge();
        let bad = "<<<<<<< base\nAssignee  bob\n".to_string();
        let surface = Scripted::new(vec![
            Some(bad.clone()),
            Some(bad.clone()),
            Some(bad),
        ]);

        let err = resolve_conflicts(&result, &surface).unwrap_err();
        assert!(matches!(
            err,
            JiloError::ConflictResolutionFailed { ref key } if key == "PROJ-1"
        ));
    }

    #[test]
    fn aborted_editor_counts_as_failed_attempt() {
        let result = conflicted_merge();
        let surface = Scripted::new(vec![
            None,
            None,
            Some("Assignee  carol\n".to_string()),
        ]);

        // two aborts burn two attempts, the third succeeds
        let issue = resolve_conflicts(&result, &surface).unwrap();
        assert_eq!(issue.assignee.as_deref(), Some("carol"));
    }

    #[test]
    fn empty_value_unsets_the_field() {
        let result = conflicted_merge();
        let surface = Scripted::new(vec![Some("Assignee\n".to_string())]);

        let issue = resolve_conflicts(&result, &surface).unwrap();
        assert_eq!(issue.assignee, None);
    }
}
