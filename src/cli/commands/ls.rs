use crate::cli::LsArgs;
use crate::cli::commands::open_workspace;
use crate::config::CliOverrides;
use crate::error::{JiloError, Result};
use crate::format;
use crate::model::Issue;

/// Execute the ls command.
///
/// # Errors
///
/// Returns an error for unknown project filters.
pub fn execute(args: &LsArgs, cli: &CliOverrides) -> Result<()> {
    let ctx = open_workspace(cli)?;

    let project_id = match &args.project {
        Some(key) => Some(
            ctx.config
                .find_project(key)
                .ok_or_else(|| JiloError::ProjectNotConfigured { key: key.clone() })?
                .id(),
        ),
        None => None,
    };

    let issues: Vec<&Issue> = ctx
        .store
        .values()
        .filter(|i| project_id.as_ref().is_none_or(|id| &i.project_id == id))
        .filter(|i| {
            args.status.as_ref().is_none_or(|s| {
                i.status
                    .as_deref()
                    .is_some_and(|status| status.eq_ignore_ascii_case(s))
            })
        })
        .filter(|i| !args.modified || i.modified() || !i.exists())
        .collect();

    if cli.json {
        let maps: Vec<_> = issues.iter().map(|i| i.to_map()).collect();
        println!("{}", serde_json::to_string_pretty(&maps)?);
        return Ok(());
    }

    if issues.is_empty() {
        println!("No issues cached");
        return Ok(());
    }
    print!("{}", format::issue_table(&issues));
    Ok(())
}
