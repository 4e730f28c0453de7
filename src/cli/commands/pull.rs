use crate::cli::PullArgs;
use crate::cli::commands::open_workspace;
use crate::config::CliOverrides;
use crate::error::{JiloError, Result};
use crate::merge::resolution::EditorSurface;
use crate::remote::HttpTransport;
use crate::sync::Syncer;
use std::collections::BTreeSet;

/// Execute the pull command.
///
/// # Errors
///
/// Returns an error when nothing is configured, a selected project is
/// unknown, or any project failed entirely (after the others completed).
pub fn execute(args: &PullArgs, cli: &CliOverrides) -> Result<()> {
    let mut ctx = open_workspace(cli)?;
    let transport = HttpTransport::new()?;
    let surface = EditorSurface;

    let mut syncer = Syncer {
        dir: &ctx.dir,
        config: &mut ctx.config,
        store: &mut ctx.store,
        storage: &mut ctx.storage,
        transport: &transport,
        surface: &surface,
    };

    if args.reset_hard {
        let reset = syncer.reset_local_modifications()?;
        eprintln!("Discarded offline modifications on {reset} issues");
    }

    let projects: Option<BTreeSet<String>> = if args.projects.is_empty() {
        None
    } else {
        Some(args.projects.iter().cloned().collect())
    };

    let outcome = syncer.pull(projects.as_ref(), args.force)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "Retrieved {} issues ({} merged, {} skipped)",
            outcome.fetched, outcome.merged, outcome.skipped
        );
    }

    if outcome.failed_projects.is_empty() {
        Ok(())
    } else {
        Err(JiloError::Config(format!(
            "failed pulling projects: {}",
            outcome.failed_projects.join(", ")
        )))
    }
}
