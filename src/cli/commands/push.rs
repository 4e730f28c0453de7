use crate::cli::commands::open_workspace;
use crate::config::CliOverrides;
use crate::error::{JiloError, Result};
use crate::merge::resolution::EditorSurface;
use crate::remote::HttpTransport;
use crate::sync::Syncer;

/// Execute the push command.
///
/// # Errors
///
/// Returns [`JiloError::PushIncomplete`] when fewer records were pushed
/// than attempted, giving a non-zero exit status.
pub fn execute(cli: &CliOverrides) -> Result<()> {
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

    let outcome = syncer.push()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Pushed {} of {} issues", outcome.pushed, outcome.total);
    }

    if outcome.complete() {
        Ok(())
    } else {
        Err(JiloError::PushIncomplete {
            pushed: outcome.pushed,
            total: outcome.total,
        })
    }
}
