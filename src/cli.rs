use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Automatic developer dashboard for Python projects.
///
/// devdash re-runs flake8, mypy and pytest whenever a relevant file's content
/// actually changes, and shows live pass/fail status for each.
#[derive(Parser, Debug)]
#[command(
    name = "devdash",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a project and re-run the checks on every content change.
    Watch {
        /// Path to the project root to watch.
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Run the checks once and report.
    ///
    /// Exits non-zero when any check reports issues or fails to run.
    Check {
        /// Path to the project root to check.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Only run the named checks (comma-separated: flake8,mypy,pytest).
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Output results as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}
