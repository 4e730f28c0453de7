//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

pub mod commands;

/// Offline-first Jira client (`SQLite` cache + three-way merge sync)
#[derive(Parser, Debug)]
#[command(name = "jilo", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace directory (bypass .jilo discovery)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a jilo workspace in the current directory
    Init {
        /// Overwrite an existing workspace
        #[arg(long)]
        force: bool,
    },

    /// Configure a remote project from its URI
    Clone(CloneArgs),

    /// Pull changed issues from the remote server
    Pull(PullArgs),

    /// Push new/changed issues back to the remote server
    Push,

    /// Create a new issue offline
    New(NewArgs),

    /// Edit an issue's fields
    Edit(EditArgs),

    /// Show issue details
    Show {
        /// Issue key (server key, or a unique prefix of a temporary key)
        key: String,

        /// Show offline changes against the last-seen remote state
        #[arg(long)]
        diff: bool,
    },

    /// List cached issues
    Ls(LsArgs),

    /// List configured projects
    Projects,

    /// Per-project issue counts
    Stats,

    /// Import issues from JSON lines on stdin
    Import,

    /// Generate shell completions
    Completions {
        /// Shell to generate for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Project URI, e.g. https://jira.example.com/PROJ
    pub uri: String,

    /// Username for basic auth
    #[arg(long)]
    pub username: Option<String>,

    /// Password/token for basic auth (or set JILO_PASSWORD)
    #[arg(long, env = "JILO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Skip the initial metadata fetch
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Project keys to pull (default: all configured)
    #[arg(long, value_delimiter = ',')]
    pub projects: Vec<String>,

    /// Ignore the watermark and pull everything
    #[arg(long)]
    pub force: bool,

    /// Discard local modifications before a forced pull
    #[arg(long, requires = "force")]
    pub reset_hard: bool,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Project key
    pub project: String,

    /// Issue type (must be valid for the project)
    pub issuetype: String,

    /// Summary text
    pub summary: String,

    #[arg(long)]
    pub assignee: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    /// Link to an epic by key, epic name or summary
    #[arg(long)]
    pub epic_link: Option<String>,

    /// Comma-separated labels
    #[arg(long)]
    pub labels: Option<String>,

    #[arg(long)]
    pub story_points: Option<String>,

    /// Extra fields as field=value (repeatable, supports extended.<key>)
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub set: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Issue key
    pub key: String,

    /// Edit interactively in $EDITOR
    #[arg(long, short)]
    pub editor: bool,

    #[arg(long)]
    pub summary: Option<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    /// Link to an epic by key, epic name or summary
    #[arg(long)]
    pub epic_link: Option<String>,

    #[arg(long)]
    pub story_points: Option<String>,

    /// Comma-separated labels to add
    #[arg(long)]
    pub labels: Option<String>,

    /// Comma-separated labels to remove
    #[arg(long)]
    pub remove_labels: Option<String>,

    /// Extra fields as field=value (repeatable, supports extended.<key>)
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub set: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Filter by project key
    #[arg(long)]
    pub project: Option<String>,

    /// Filter by status
    #[arg(long)]
    pub status: Option<String>,

    /// Only issues with offline modifications
    #[arg(long)]
    pub modified: bool,
}
