use clap::Parser;
use jilo::JiloError;
use jilo::cli::{Cli, Commands, commands};
use jilo::config::CliOverrides;
use jilo::logging::init_logging;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {e}");
        // continue without logging rather than aborting
    }

    let overrides = CliOverrides {
        dir: cli.dir.clone(),
        json: cli.json,
        no_color: cli.no_color,
        verbose: cli.verbose > 0,
    };

    let result = match cli.command {
        Commands::Init { force } => commands::init::execute(force),
        Commands::Clone(args) => commands::clone::execute(&args, &overrides),
        Commands::Pull(args) => commands::pull::execute(&args, &overrides),
        Commands::Push => commands::push::execute(&overrides),
        Commands::New(args) => commands::new::execute(&args, &overrides),
        Commands::Edit(args) => commands::edit::execute(&args, &overrides),
        Commands::Show { key, diff } => commands::show::execute(&key, diff, &overrides),
        Commands::Ls(args) => commands::ls::execute(&args, &overrides),
        Commands::Projects => commands::projects::execute(&overrides),
        Commands::Stats => commands::stats::execute(&overrides),
        Commands::Import => commands::import::execute(&overrides),
        Commands::Completions { shell } => commands::completions::execute(shell),
    };

    if let Err(e) = result {
        handle_error(&e);
    }
}

fn handle_error(err: &JiloError) -> ! {
    eprintln!("Error: {err}");
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  {suggestion}");
    }
    std::process::exit(err.exit_code());
}
