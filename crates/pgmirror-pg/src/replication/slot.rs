//! Replication slot management.

use tokio_postgres::Client;
use tracing::{info, warn};

use super::lsn::Lsn;
use crate::error::{PgError, PgResult};

const PLUGIN: &str = "pgoutput";

/// Row of `pg_replication_slots` for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub plugin: Option<String>,
    pub confirmed_flush: Option<Lsn>,
    pub active: bool,
}

/// Look up a slot, `None` when it does not exist.
pub async fn slot_info(client: &Client, slot_name: &str) -> PgResult<Option<SlotInfo>> {
    let row = client
        .query_opt(
            "SELECT plugin::text, confirmed_flush_lsn::text, active \
             FROM pg_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let confirmed: Option<String> = row.get(1);
    Ok(Some(SlotInfo {
        plugin: row.get(0),
        confirmed_flush: confirmed.map(|lsn| lsn.parse()).transpose()?,
        active: row.get(2),
    }))
}

pub async fn slot_exists(client: &Client, slot_name: &str) -> PgResult<bool> {
    Ok(slot_info(client, slot_name).await?.is_some())
}

/// Create a logical replication slot decoding with pgoutput.
pub async fn create_slot(client: &Client, slot_name: &str) -> PgResult<Lsn> {
    info!(slot = %slot_name, "Creating replication slot");
    let row = client
        .query_one(
            "SELECT lsn::text FROM pg_create_logical_replication_slot($1, $2)",
            &[&slot_name, &PLUGIN],
        )
        .await
        .map_err(|e| PgError::SlotCreationFailed(e.to_string()))?;

    let lsn: String = row.get(0);
    lsn.parse()
}

pub async fn drop_slot(client: &Client, slot_name: &str) -> PgResult<()> {
    info!(slot = %slot_name, "Dropping replication slot");
    client
        .execute("SELECT pg_drop_replication_slot($1)", &[&slot_name])
        .await
        .map_err(|e| PgError::Replication(format!("Failed to drop slot: {}", e)))?;

    Ok(())
}

/// Make sure `slot_name` exists and decodes with pgoutput.
///
/// A slot using another plugin is dropped and recreated. A missing slot is
/// created only when `create_if_missing` is set.
pub async fn ensure_slot(client: &Client, slot_name: &str, create_if_missing: bool) -> PgResult<()> {
    match slot_info(client, slot_name).await? {
        Some(info) if info.plugin.as_deref() == Some(PLUGIN) => {
            info!(slot = %slot_name, confirmed = ?info.confirmed_flush, "Using existing replication slot");
        }
        Some(info) => {
            warn!(
                slot = %slot_name,
                plugin = ?info.plugin,
                "Existing slot uses wrong plugin, dropping and recreating"
            );
            drop_slot(client, slot_name).await?;
            create_slot(client, slot_name).await?;
        }
        None if create_if_missing => {
            create_slot(client, slot_name).await?;
        }
        None => return Err(PgError::SlotNotFound(slot_name.to_string())),
    }

    Ok(())
}
