use crate::cli::NewArgs;
use crate::cli::commands::{find_linked_issue, open_workspace, split_set_pair};
use crate::config::CliOverrides;
use crate::error::{JiloError, Result};
use crate::model::Issue;

/// Execute the new command: create an issue offline under a temporary key.
///
/// # Errors
///
/// Returns an error for unknown projects, invalid issue types, bad field
/// values, or persistence failures.
pub fn execute(args: &NewArgs, cli: &CliOverrides) -> Result<()> {
    let mut ctx = open_workspace(cli)?;

    let project = ctx
        .config
        .find_project(&args.project)
        .ok_or_else(|| JiloError::ProjectNotConfigured {
            key: args.project.clone(),
        })?;

    // issue types are validated against project metadata when we have it
    if !project.issuetypes.is_empty() && !project.issuetypes.contains(&args.issuetype) {
        return Err(JiloError::InvalidIssueType {
            issuetype: args.issuetype.clone(),
            project: project.key.clone(),
        });
    }

    let mut issue = Issue::new_local(&project.id(), &args.issuetype, &args.summary);

    if let Some(v) = &args.assignee {
        issue.set_field("assignee", v)?;
    }
    if let Some(v) = &args.description {
        issue.set_field("description", v)?;
    }
    if let Some(v) = &args.priority {
        issue.set_field("priority", v)?;
    }
    if let Some(v) = &args.story_points {
        issue.set_field("story_points", v)?;
    }
    if let Some(v) = &args.labels {
        issue.add_to_set("labels", v)?;
    }
    for pair in &args.set {
        let (field, value) = split_set_pair(pair)?;
        issue.set_field(field, value)?;
    }
    if let Some(search) = &args.epic_link {
        let epic_key = find_linked_issue(&ctx.store, search)?.key.clone();
        issue.set_field("epic_link", &epic_key)?;
    }

    let key = issue.key.clone();
    ctx.store.upsert(issue);
    ctx.persist()?;

    if cli.json {
        let issue = ctx.store.get(&key).expect("just inserted");
        println!("{}", serde_json::to_string_pretty(&issue.to_map())?);
    } else {
        println!("{key}");
    }
    Ok(())
}
