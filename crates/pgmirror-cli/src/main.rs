use std::path::Path;

use anyhow::Result;
use clap::Parser;
use pgmirror_config::ProjectConfig;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod env;
mod runner;

use cli::{Cli, Commands};
use commands::{cmd_init, cmd_reset, cmd_run, cmd_setup, cmd_status};
use config::load_config;
use env::{env_file_name, load_dotenv_from_ancestors};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgmirror=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init(Path::new(".")).await,
        Commands::Setup => cmd_setup(load(&cli.env, &cli.config)?).await,
        Commands::Run { once } => cmd_run(load(&cli.env, &cli.config)?, once).await,
        Commands::Status => cmd_status(load(&cli.env, &cli.config)?).await,
        Commands::Reset => cmd_reset(load(&cli.env, &cli.config)?).await,
    }
}

/// Load the dotenv file for `env`, then the config it resolves against.
fn load(env: &Option<String>, path: &Path) -> Result<ProjectConfig> {
    load_dotenv_from_ancestors(&env_file_name(env.as_deref()))?;
    load_config(path)
}
