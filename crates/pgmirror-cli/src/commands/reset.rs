use anyhow::{Context, Result};
use colored::Colorize;

use pgmirror_config::ProjectConfig;
use pgmirror_pg::{connect_postgres, drop_slot, slot_info};
use pgmirror_state::MetadataStore;

use crate::runner::open_metadata_store;

/// Drop the slot and forget the checkpoint. The next `setup` starts a fresh
/// slot at the current WAL position.
pub async fn cmd_reset(config: ProjectConfig) -> Result<()> {
    let slot = &config.replication.slot;
    println!("Resetting replication state for slot '{}'...\n", slot);

    let client = connect_postgres(&config.postgres_connection_string()?)
        .await
        .context("Failed to connect to Postgres")?;

    match slot_info(&client, slot).await? {
        Some(info) if info.active => {
            anyhow::bail!("Slot '{}' is in use by another consumer, stop it first", slot);
        }
        Some(_) => {
            drop_slot(&client, slot).await?;
            println!("Dropped slot {}", slot);
        }
        None => println!("Slot {} does not exist, skipping", slot),
    }

    let store = open_metadata_store(&config)?;
    store.clear(slot)?;
    println!("Cleared checkpoint for {}", slot);

    println!("\n{}", "Reset complete!".green());
    Ok(())
}
