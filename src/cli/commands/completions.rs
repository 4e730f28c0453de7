use crate::cli::Cli;
use crate::error::Result;
use clap::CommandFactory;
use clap_complete::Shell;

/// Execute the completions command.
///
/// # Errors
///
/// Infallible in practice; signature matches the other commands.
pub fn execute(shell: Shell) -> Result<()> {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "jilo", &mut std::io::stdout());
    Ok(())
}
