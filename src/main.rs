mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use mysql_service::{Config, Error as ServiceError, Parser as ConfigParser};
use output::{CliOutput, QuietOutput, UserOutput};
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        // Every error has already been reported per instance.
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if let Some(service_error) = e.downcast_ref::<ServiceError>() {
                eprintln!("Error: {}", service_error);
                if let Some(suggestion) = service_error.suggestion() {
                    eprintln!("\nHint: {}", suggestion);
                }
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when any instance failed to converge.
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();
    init_tracing();

    let out: &dyn UserOutput = if cli.json { &QuietOutput } else { &CliOutput };

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(true);
    }

    let config_path = resolve_config_path(cli.config.clone())?;
    let config = load_config(&cli, &config_path)?;

    match &cli.command {
        Commands::Validate => {
            commands::run_validate(&config, &config_path, cli.json, out)?;
            Ok(true)
        }
        Commands::Plan { action, instances } => {
            commands::run_plan(config, *action, instances, cli.json, out)?;
            Ok(true)
        }
        command => match command.action() {
            Some((action, selection)) => {
                commands::run_action(config, action, selection, cli.json, out).await
            }
            None => Ok(true),
        },
    }
}

fn resolve_config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(ConfigParser::new().find_config_file()?),
    }
}

fn load_config(cli: &Cli, path: &Path) -> anyhow::Result<Config> {
    let mut config = ConfigParser::new().load_config(path)?;
    if let Some(name) = &cli.platform {
        config.platform.name = name.clone();
    }
    if let Some(version) = &cli.platform_version {
        config.platform.version = version.clone();
    }
    tracing::debug!("Loaded {} for {}", path.display(), config.platform);
    Ok(config)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
