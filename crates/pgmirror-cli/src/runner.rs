use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use pgmirror_config::{to_layouts, ProjectConfig};
use pgmirror_core::TableStore;
use pgmirror_pg::{ensure_slot, ConsumeOutcome, PgSlotSource, ReplicaConsumer, SlotSourceConfig};
use pgmirror_state::{Metadata, SqliteMetadataStore};

/// Open the persisted metadata store named by the config.
pub fn open_metadata_store(config: &ProjectConfig) -> Result<SqliteMetadataStore> {
    SqliteMetadataStore::open(&config.state.path)
        .with_context(|| format!("Failed to open state database: {}", config.state.path))
}

/// Run the replication loop against `store`.
///
/// Each cycle pulls one block of changes from the slot, buffers them and
/// checkpoints what was flushed. Cycles that made no progress are followed by
/// a `poll_interval_ms` sleep. With `once`, a single cycle runs.
pub async fn run_replication<T: TableStore>(config: &ProjectConfig, store: T, once: bool) -> Result<()> {
    let layouts = to_layouts(config)?;
    let replication = &config.replication;

    let source = PgSlotSource::connect(SlotSourceConfig {
        connection_string: config.postgres_connection_string()?,
        slot_name: replication.slot.clone(),
        publication: replication.publication.clone(),
    })
    .await
    .context("Failed to connect to Postgres")?;

    ensure_slot(source.client(), &replication.slot, replication.create_slot)
        .await
        .context("Failed to prepare replication slot")?;

    let metadata = Metadata::load(open_metadata_store(config)?, &replication.slot)
        .context("Failed to load replication metadata")?;

    info!(
        slot = %replication.slot,
        publication = %replication.publication,
        tables = layouts.len(),
        max_block_size = replication.max_block_size,
        version = metadata.version(),
        "Starting replication"
    );

    let mut consumer = ReplicaConsumer::new(source, store, metadata, layouts)
        .with_max_block_size(replication.max_block_size);
    consumer.resume().await;

    let poll_interval = Duration::from_millis(replication.poll_interval_ms);
    let mut quarantined = BTreeSet::new();
    let mut total_rows: u64 = 0;

    loop {
        let outcome = consumer.consume().await.context("Replication stopped")?;
        total_rows += outcome.rows_buffered as u64;
        report_quarantine(&mut quarantined, &outcome);

        if once {
            info!(
                records = outcome.records,
                rows = outcome.rows_buffered,
                lsn = %consumer.confirmed(),
                "Single poll cycle complete"
            );
            return Ok(());
        }

        if !outcome.made_progress {
            debug!(total_rows, lsn = %consumer.confirmed(), "No progress, sleeping");
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Warn when the set of quarantined tables changes.
fn report_quarantine(known: &mut BTreeSet<String>, outcome: &ConsumeOutcome) {
    if outcome.quarantined_tables == *known {
        return;
    }

    let new: Vec<&String> = outcome.quarantined_tables.difference(known).collect();
    if !new.is_empty() {
        warn!(
            tables = ?new,
            "Tables quarantined by schema drift, resync them out of band and restart"
        );
    }
    *known = outcome.quarantined_tables.clone();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(tables: &[&str]) -> ConsumeOutcome {
        ConsumeOutcome {
            quarantined_tables: tables.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_report_quarantine_tracks_set() {
        let mut known = BTreeSet::new();

        report_quarantine(&mut known, &outcome(&[]));
        assert!(known.is_empty());

        report_quarantine(&mut known, &outcome(&["orders"]));
        assert_eq!(known, BTreeSet::from(["orders".to_string()]));

        report_quarantine(&mut known, &outcome(&["items", "orders"]));
        assert_eq!(known.len(), 2);
    }
}
