use crate::cli::CloneArgs;
use crate::cli::commands::open_workspace;
use crate::config::{CliOverrides, ProjectMeta};
use crate::error::Result;
use crate::remote::{HttpTransport, Transport};
use crate::sync::apply_details;

/// Execute the clone command: register a remote project from its URI and
/// fetch its metadata.
///
/// # Errors
///
/// Returns an error for a bad URI, an unreachable remote (unless
/// `--offline`), or config write failures.
pub fn execute(args: &CloneArgs, cli: &CliOverrides) -> Result<()> {
    let mut ctx = open_workspace(cli)?;

    let mut project = ProjectMeta::factory(&args.uri)?;
    project.username = args.username.clone();
    project.password = args.password.clone();

    if !args.offline {
        let transport = HttpTransport::new()?;
        let details = transport.get_project_details(&project)?;
        apply_details(&mut project, details);
    }

    let key = project.key.clone();
    let name = project.name.clone();
    ctx.config.projects.insert(project.id(), project);
    ctx.write_config()?;

    match name {
        Some(name) => println!("Configured project {key} ({name})"),
        None => println!("Configured project {key}"),
    }
    Ok(())
}
