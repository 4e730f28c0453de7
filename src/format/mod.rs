//! Text rendering for issues, lists and diffs.
//!
//! Everything here produces plain strings; callers decide where they go.
//! Color is applied only when requested (tty + not disabled).

use crate::model::{EXTENDED_PREFIX, FIELD_SCHEMA, Issue, PatchOp};
use crossterm::style::Stylize;
use serde_json::Value;
use unicode_width::UnicodeWidthStr;

/// Render a canonical JSON field value as user-facing text.
///
/// Sets become comma-separated lists; null/absent renders empty.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Align two-column rows into a text block.
///
/// The first column is padded to the widest title; rows with an empty value
/// render as the bare title. Multi-line values continue unindented on the
/// following lines.
#[must_use]
pub fn tabulate(rows: &[(String, String)]) -> String {
    let width = rows
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(t, _)| t.width())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (title, value) in rows {
        if value.is_empty() {
            out.push_str(title);
            out.push('\n');
            continue;
        }
        let mut lines = value.lines();
        let first = lines.next().unwrap_or_default();
        let pad = " ".repeat(width.saturating_sub(title.width()) + 2);
        out.push_str(&format!("{title}{pad}{first}\n"));
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Render one issue as (title, value) rows in display order.
#[must_use]
pub fn issue_rows(issue: &Issue) -> Vec<(String, String)> {
    let map = issue.to_map();
    let mut rows = Vec::new();

    for spec in FIELD_SCHEMA {
        if matches!(spec.name, "key" | "project_id" | "id") {
            continue;
        }
        if let Some(v) = map.get(spec.name) {
            let mut rendered = render_value(v);
            if spec.name == "summary" {
                rendered = format!("[{}] {rendered}", issue.key);
            }
            rows.push((spec.friendly.to_string(), rendered));
        }
    }
    for (k, v) in &issue.extended {
        rows.push((format!("{EXTENDED_PREFIX}{k}"), v.clone()));
    }
    rows
}

/// Render a full issue as aligned text.
#[must_use]
pub fn render_issue(issue: &Issue) -> String {
    tabulate(&issue_rows(issue))
}

/// Render the offline changes of an issue against its snapshot in +/-
/// style. Returns `None` when nothing differs.
#[must_use]
pub fn render_diff(issue: &Issue, color: bool) -> Option<String> {
    let patch = issue.diff();
    if patch.is_empty() {
        return None;
    }

    let title_of = |path: &str| {
        crate::model::field_spec(path)
            .filter(|_| !path.starts_with(EXTENDED_PREFIX))
            .map_or_else(|| path.to_string(), |spec| spec.friendly.to_string())
    };

    let mut rows = Vec::new();
    for op in &patch {
        let title = title_of(op.path());
        match op {
            PatchOp::Add { value, .. } => {
                rows.push((paint(&format!("+{title}"), Tone::Added, color), render_value(value)));
            }
            PatchOp::Remove { value, .. } => {
                rows.push((paint(&format!("-{title}"), Tone::Removed, color), render_value(value)));
            }
            PatchOp::Change { old, new, .. } => {
                rows.push((paint(&format!("-{title}"), Tone::Removed, color), render_value(old)));
                rows.push((paint(&format!("+{title}"), Tone::Added, color), render_value(new)));
            }
        }
    }
    Some(tabulate(&rows))
}

/// Render a table of issues for `jilo ls`.
#[must_use]
pub fn issue_table(issues: &[&Issue]) -> String {
    let headers = ["KEY", "TYPE", "SUMMARY", "STATUS", "ASSIGNEE"];
    let mut table: Vec<[String; 5]> = vec![headers.map(String::from)];

    for issue in issues {
        let key = if issue.exists() {
            issue.key.clone()
        } else {
            // temporary uuid keys are noisy, show a shortened form
            format!("new:{}", &issue.key[..8])
        };
        table.push([
            key,
            issue.issuetype.clone(),
            issue.summary.clone(),
            issue.status.clone().unwrap_or_default(),
            issue.assignee.clone().unwrap_or_default(),
        ]);
    }

    let mut widths = [0usize; 5];
    for row in &table {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let mut out = String::new();
    for row in &table {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell}{}", " ".repeat(widths[i] - cell.width())))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[derive(Clone, Copy)]
enum Tone {
    Added,
    Removed,
}

fn paint(text: &str, tone: Tone, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match tone {
        Tone::Added => text.green().to_string(),
        Tone::Removed => text.red().to_string(),
    }
}
