mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use devdash::check::checks_from_config;
use devdash::config::DevdashConfig;
use devdash::controller::{CheckState, Controller, DisplaySurface};
use devdash::output::{ConsoleSurface, JsonSurface};
use devdash::session;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays clean for the dashboard and JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devdash=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { path } => {
            let config = DevdashConfig::load(&path);
            session::run_watch(&path, &config, Arc::new(ConsoleSurface::stdout())).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { path, only, json } => {
            let root = path.canonicalize()?;
            let config = DevdashConfig::load(&root);
            let mut checks = checks_from_config(&config);
            if !only.is_empty() {
                checks.retain(|c| only.contains(&c.name));
                if checks.is_empty() {
                    bail!("no enabled check matches --only {}", only.join(","));
                }
            }

            let json_surface = Arc::new(JsonSurface::new());
            let surface: Arc<dyn DisplaySurface> = if json {
                json_surface.clone()
            } else {
                Arc::new(ConsoleSurface::stdout())
            };

            let controller = Controller::new(checks, surface, &root);
            controller.trigger_all();
            controller.wait_idle().await;

            if json {
                println!("{}", json_surface.to_json()?);
            }

            let all_clean = controller
                .checks()
                .all(|c| controller.state(&c.name) == Some(CheckState::Clean));
            Ok(if all_clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
