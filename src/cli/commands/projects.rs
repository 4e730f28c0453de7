use crate::cli::commands::open_workspace;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::format::tabulate;

/// Execute the projects command: list configured projects and watermarks.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened.
pub fn execute(cli: &CliOverrides) -> Result<()> {
    let ctx = open_workspace(cli)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&ctx.config.projects)?);
        return Ok(());
    }

    if ctx.config.projects.is_empty() {
        println!("No projects configured");
        return Ok(());
    }

    for project in ctx.config.projects.values() {
        let rows = vec![
            ("Key".to_string(), project.key.clone()),
            ("Name".to_string(), project.name.clone().unwrap_or_default()),
            ("Project URI".to_string(), project.project_uri()),
            (
                "Last Sync".to_string(),
                project.last_updated.clone().unwrap_or_default(),
            ),
        ];
        println!("{}", tabulate(&rows));
    }
    Ok(())
}
