//! Playbook Dispatcher
//!
//! Main entry point: `run` the long-lived modules, `clean` expired runs
//! once, or `migrate` the database schema.

mod api;
mod startup;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dispatcher_server_infrastructure::{init_tracing, TracingConfig};
use dispatcher_shared::config::{validate_dispatcher_config, ConfigLoader};
use startup::Module;

/// CLI arguments for playbook-dispatcher
#[derive(Parser, Debug)]
#[command(name = "playbook-dispatcher")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dispatches playbook runs and tracks their outcome", long_about = None)]
struct Cli {
    /// Optional .env file loaded before reading the environment
    #[arg(long, env = "DISPATCHER_ENV_FILE", global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the selected modules (all of them when none is given)
    Run {
        #[arg(long = "module", value_enum)]
        modules: Vec<Module>,
    },
    /// Mark expired runs as timed out, once
    Clean,
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new(cli.env_file).load_dispatcher_config()?;
    validate_dispatcher_config(&config)?;

    let tracing = init_tracing(&TracingConfig::from(&config.logging));
    for error in &tracing.errors {
        eprintln!("tracing not initialized: {}", error);
    }

    match cli.command {
        Command::Run { modules } => startup::run(config, modules).await,
        Command::Clean => startup::clean(&config).await,
        Command::Migrate => startup::migrate(&config).await,
    }
}
