use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CONFIG_FILE;

#[derive(Parser)]
#[command(name = "pgmirror")]
#[command(about = "Replay Postgres logical replication changes into versioned destination tables")]
#[command(version)]
pub struct Cli {
    /// Environment to load (loads .env.{ENV} instead of .env)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a sample pgmirror.toml and .env.example in the current directory
    Init,

    /// Create the publication and the replication slot
    Setup,

    /// Start the replication loop
    Run {
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Show the persisted checkpoint and the slot position
    Status,

    /// Drop the replication slot and clear persisted metadata
    Reset,
}
