use anyhow::{Context, Result};
use colored::Colorize;

use pgmirror_config::ProjectConfig;
use pgmirror_pg::{connect_postgres, ensure_publication, ensure_slot};

use crate::config::publication_tables;

pub async fn cmd_setup(config: ProjectConfig) -> Result<()> {
    let replication = &config.replication;
    let tables = publication_tables(&config);

    println!("Setting up logical replication...\n");
    println!("  Publication: {}", replication.publication);
    for table in &tables {
        println!("    - {}", table);
    }
    println!("  Slot:        {} (pgoutput)", replication.slot);
    println!();

    let client = connect_postgres(&config.postgres_connection_string()?)
        .await
        .context("Failed to connect to Postgres")?;

    ensure_publication(&client, &replication.publication, &tables)
        .await
        .context("Failed to create publication")?;

    // Setup always creates the slot, create_slot only governs `run`
    ensure_slot(&client, &replication.slot, true)
        .await
        .context("Failed to create replication slot")?;

    println!("{}", "Replication set up successfully!".green());
    println!("\nNext steps:");
    println!("  1. Load existing rows into the destination");
    println!("  2. Run: pgmirror run\n");

    Ok(())
}
