use crate::cli::commands::{Context, open_workspace};
use crate::config::CliOverrides;
use crate::error::{JiloError, Result};
use crate::model::{FieldMap, Issue};
use serde_json::Value;
use std::io::BufRead;
use tracing::warn;

/// Execute the import command: upsert issues from JSON lines on stdin.
///
/// Records with a `key` patch the existing cached issue; records without
/// one create a new local issue (requiring `project`, `issuetype` and
/// `summary`). Bad lines are logged with their line number and skipped.
///
/// # Errors
///
/// Returns an error when any line failed, after processing all of them.
pub fn execute(cli: &CliOverrides) -> Result<()> {
    let mut ctx = open_workspace(cli)?;

    let stdin = std::io::stdin();
    let mut updated = 0usize;
    let mut created = 0usize;
    let mut failed = 0usize;

    for (idx, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match import_line(&mut ctx, &line) {
            Ok(true) => created += 1,
            Ok(false) => updated += 1,
            Err(e) => {
                warn!(line = idx + 1, "import failed: {e}");
                failed += 1;
            }
        }
    }

    ctx.persist()?;
    println!("Imported {updated} updated, {created} new, {failed} failed");

    if failed == 0 {
        Ok(())
    } else {
        Err(JiloError::Config(format!("{failed} import lines failed")))
    }
}

/// Import one JSON line. Returns true when a new issue was created.
fn import_line(ctx: &mut Context, line: &str) -> Result<bool> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(obj) = value else {
        return Err(JiloError::malformed("<import>", "line is not an object"));
    };
    let mut attrs: FieldMap = obj.into_iter().collect();

    if let Some(key) = attrs.get("key").and_then(Value::as_str).map(String::from) {
        // update to an existing issue
        attrs.remove("project");
        let issue = ctx
            .store
            .get_mut(&key)
            .ok_or_else(|| JiloError::IssueNotFound { key: key.clone() })?;
        issue.patch_from_map(&attrs)?;
        return Ok(false);
    }

    // new issue: mandatory project, issuetype, summary
    let mandatory = |field: &str, attrs: &FieldMap| -> Result<String> {
        attrs
            .get(field)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| JiloError::malformed("<import>", format!("new issue missing '{field}'")))
    };
    let project_key = mandatory("project", &attrs)?;
    let issuetype = mandatory("issuetype", &attrs)?;
    let summary = mandatory("summary", &attrs)?;

    let project = ctx
        .config
        .find_project(&project_key)
        .ok_or_else(|| JiloError::ProjectNotConfigured { key: project_key })?;

    attrs.remove("project");
    attrs.remove("issuetype");
    attrs.remove("summary");

    let mut issue = Issue::new_local(&project.id(), &issuetype, &summary);
    issue.patch_from_map(&attrs)?;
    ctx.store.upsert(issue);
    Ok(true)
}
