use clap::{Args, Parser, Subcommand};
use mysql_service::Action;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mysql-service")]
#[command(about = "Converge named MySQL service instances on this host")]
pub struct Cli {
    /// Config file path (defaults to mysql-service.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the platform name declared in the config (e.g. centos)
    #[arg(long, global = true, env = "MYSQL_SERVICE_PLATFORM")]
    pub platform: Option<String>,

    /// Override the platform version declared in the config (e.g. 7.0)
    #[arg(long, global = true, env = "MYSQL_SERVICE_PLATFORM_VERSION")]
    pub platform_version: Option<String>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct Selection {
    /// Instances to act on (defaults to all declared instances)
    pub instances: Vec<String>,

    /// Evaluate guards and report what would run without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install, configure and initialize instances
    Create(Selection),
    /// Start instances through their init scripts
    Start(Selection),
    /// Stop instances
    Stop(Selection),
    /// Restart instances
    Restart(Selection),
    /// Reload instances
    Reload(Selection),
    /// Delete instances
    Delete(Selection),
    /// Print the ordered operations an action would perform, without evaluating guards
    Plan {
        /// Action to plan
        #[arg(value_enum)]
        action: Action,

        /// Instances to plan for (defaults to all declared instances)
        instances: Vec<String>,
    },
    /// Validate the configuration and show each instance's derived layout
    Validate,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// The lifecycle action and selection of an action subcommand.
    pub fn action(&self) -> Option<(Action, &Selection)> {
        match self {
            Commands::Create(sel) => Some((Action::Create, sel)),
            Commands::Start(sel) => Some((Action::Start, sel)),
            Commands::Stop(sel) => Some((Action::Stop, sel)),
            Commands::Restart(sel) => Some((Action::Restart, sel)),
            Commands::Reload(sel) => Some((Action::Reload, sel)),
            Commands::Delete(sel) => Some((Action::Delete, sel)),
            _ => None,
        }
    }
}
