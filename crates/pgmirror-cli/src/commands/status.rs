use anyhow::{Context, Result};
use colored::Colorize;

use pgmirror_config::ProjectConfig;
use pgmirror_pg::{connect_postgres, format_lsn, slot_info};
use pgmirror_state::MetadataStore;

use crate::runner::open_metadata_store;

pub async fn cmd_status(config: ProjectConfig) -> Result<()> {
    let slot = &config.replication.slot;
    let store = open_metadata_store(&config)?;

    println!("\nReplication Status ({}):", slot);
    println!("{:-<60}", "");

    match store.load(slot)? {
        Some(checkpoint) => {
            println!("{:<24} {}", "Persisted position:", format_lsn(checkpoint.lsn));
            println!("{:<24} {}", "Version:", checkpoint.version);
            if let Some(updated_at) = checkpoint.updated_at {
                println!("{:<24} {}", "Updated:", updated_at.to_rfc3339());
            }
        }
        None => println!("No checkpoint found. Run 'pgmirror run' to start replicating."),
    }

    let client = connect_postgres(&config.postgres_connection_string()?)
        .await
        .context("Failed to connect to Postgres")?;

    match slot_info(&client, slot).await? {
        Some(info) => {
            let confirmed = info
                .confirmed_flush
                .map(|lsn| lsn.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:<24} {}", "Slot position:", confirmed);
            println!("{:<24} {}", "Slot active:", info.active);
        }
        None => println!(
            "{}",
            format!("Slot '{}' does not exist. Run 'pgmirror setup'.", slot).yellow()
        ),
    }

    println!();
    Ok(())
}
