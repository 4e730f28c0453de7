use crate::cli::commands::{open_workspace, resolve_key, use_color};
use crate::config::CliOverrides;
use crate::error::Result;
use crate::format;

/// Execute the show command.
///
/// # Errors
///
/// Returns an error when the key resolves to nothing.
pub fn execute(key: &str, diff: bool, cli: &CliOverrides) -> Result<()> {
    let ctx = open_workspace(cli)?;
    let key = resolve_key(&ctx.store, key)?;
    let issue = ctx.store.get(&key).expect("resolved key exists");

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&issue.to_map())?);
        return Ok(());
    }

    if diff {
        match format::render_diff(issue, use_color(cli)) {
            Some(rendered) => print!("{rendered}"),
            None => println!("No offline changes on {key}"),
        }
        return Ok(());
    }

    print!("{}", format::render_issue(issue));
    Ok(())
}
