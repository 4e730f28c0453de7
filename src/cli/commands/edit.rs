use crate::cli::EditArgs;
use crate::cli::commands::{find_linked_issue, open_workspace, resolve_key, split_set_pair};
use crate::config::CliOverrides;
use crate::error::{JiloError, Result};
use crate::format;
use crate::merge::resolution::{EditorSurface, MAX_ATTEMPTS, ResolutionSurface};
use crate::model::{FIELD_SCHEMA, Issue};
use tracing::error;

/// Execute the edit command: patch fields from flags, or round-trip the
/// whole issue through `$EDITOR`.
///
/// # Errors
///
/// Returns an error for unknown keys/fields, readonly fields, unparseable
/// values, or when editor parsing exhausts its retries.
pub fn execute(args: &EditArgs, cli: &CliOverrides) -> Result<()> {
    let mut ctx = open_workspace(cli)?;
    let key = resolve_key(&ctx.store, &args.key)?;

    let epic_key = match &args.epic_link {
        Some(search) => Some(find_linked_issue(&ctx.store, search)?.key.clone()),
        None => None,
    };

    let issue = ctx.store.get_mut(&key).expect("resolved key exists");

    if args.editor {
        edit_in_editor(issue, &EditorSurface)?;
    }

    for (field, value) in [
        ("summary", &args.summary),
        ("assignee", &args.assignee),
        ("description", &args.description),
        ("priority", &args.priority),
        ("story_points", &args.story_points),
    ] {
        if let Some(v) = value {
            issue.set_field(field, v)?;
        }
    }
    if let Some(v) = &args.labels {
        issue.add_to_set("labels", v)?;
    }
    if let Some(v) = &args.remove_labels {
        issue.remove_from_set("labels", v)?;
    }
    if let Some(epic) = epic_key {
        issue.set_field("epic_link", &epic)?;
    }
    for pair in &args.set {
        let (field, value) = split_set_pair(pair)?;
        issue.set_field(field, value)?;
    }

    ctx.persist()?;
    println!("Updated {key}");
    Ok(())
}

/// Round-trip the issue through the editor, retrying on unusable output.
fn edit_in_editor(issue: &mut Issue, surface: &dyn ResolutionSurface) -> Result<()> {
    let rendered = format::render_issue(issue);

    for attempt in 1..=MAX_ATTEMPTS {
        let Some(edited) = surface.edit(&rendered)? else {
            // aborted or unchanged
            return Ok(());
        };
        match apply_edited_document(issue, &edited) {
            Ok(()) => return Ok(()),
            Err(e @ (JiloError::EditorParse { .. } | JiloError::Deserialize { .. })) => {
                error!(attempt, max = MAX_ATTEMPTS, "failed parsing editor output: {e}");
            }
            Err(other) => return Err(other),
        }
    }
    Err(JiloError::EditorParse {
        reason: "retries exhausted".to_string(),
    })
}

/// Parse and apply the edited document. Changes are staged on a copy so a
/// late parse failure leaves the issue untouched.
fn apply_edited_document(issue: &mut Issue, edited: &str) -> Result<()> {
    let changes = parse_issue_document(issue, edited)?;
    let mut staged = issue.clone();
    for (path, raw) in &changes {
        staged.set_field(path, raw)?;
    }
    *issue = staged;
    Ok(())
}

/// Extract (path, value) pairs for every writable field line in the edited
/// document. Fields absent from the document are left untouched; a bare
/// title with no value unsets the field.
fn parse_issue_document(issue: &Issue, edited: &str) -> Result<Vec<(String, String)>> {
    // titles for every rendered field; longest first so longer titles win
    let mut titles: Vec<(String, String, bool)> = FIELD_SCHEMA
        .iter()
        .filter(|f| !matches!(f.name, "key" | "project_id" | "id"))
        .map(|f| (f.friendly.to_string(), f.name.to_string(), !f.readonly))
        .collect();
    for k in issue.extended.keys() {
        let path = format!("extended.{k}");
        titles.push((path.clone(), path, true));
    }
    titles.sort_by_key(|(title, _, _)| std::cmp::Reverse(title.len()));

    let summary_prefix = format!("[{}]", issue.key);
    let mut out: Vec<(String, String)> = Vec::new();
    let mut current: Option<usize> = None;

    for line in edited.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            current = None;
            continue;
        }

        let matched = titles
            .iter()
            .find(|(title, _, _)| line == title || line.starts_with(&format!("{title} ")));

        if let Some((title, path, writable)) = matched {
            current = None;
            if !writable {
                continue;
            }
            let mut value = line[title.len()..].trim().to_string();
            if path == "summary" {
                if let Some(stripped) = value.strip_prefix(&summary_prefix) {
                    value = stripped.trim().to_string();
                }
            }
            out.push((path.clone(), value));
            current = Some(out.len() - 1);
        } else if let Some(idx) = current {
            let entry = &mut out[idx].1;
            entry.push('\n');
            entry.push_str(line.trim());
        } else {
            return Err(JiloError::EditorParse {
                reason: format!("unrecognized line '{line}'"),
            });
        }
    }
    Ok(out)
}
