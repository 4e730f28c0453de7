use crate::cli::commands::open_workspace;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::format::tabulate;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ProjectStats {
    key: String,
    total: usize,
    modified: usize,
    new: usize,
}

/// Execute the stats command: per-project issue counts.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened.
pub fn execute(cli: &CliOverrides) -> Result<()> {
    let ctx = open_workspace(cli)?;

    let mut stats = Vec::new();
    for project in ctx.config.projects.values() {
        let id = project.id();
        let of_project: Vec<_> = ctx
            .store
            .values()
            .filter(|i| i.project_id == id)
            .collect();
        stats.push(ProjectStats {
            key: project.key.clone(),
            total: of_project.len(),
            modified: of_project.iter().filter(|i| i.modified()).count(),
            new: of_project.iter().filter(|i| !i.exists()).count(),
        });
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    for s in stats {
        let rows = vec![
            ("Project".to_string(), s.key),
            ("Issues".to_string(), s.total.to_string()),
            ("Modified".to_string(), s.modified.to_string()),
            ("New".to_string(), s.new.to_string()),
        ];
        println!("{}", tabulate(&rows));
    }
    Ok(())
}
