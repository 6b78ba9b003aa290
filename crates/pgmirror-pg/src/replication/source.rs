//! Upstream collaborators: pulling raw changes from a slot and advancing it.

use std::future::Future;

use tokio_postgres::Client;
use tracing::{debug, info};

use super::lsn::Lsn;
use super::slot::slot_info;
use crate::connect::connect_postgres;
use crate::error::{PgError, PgResult};

/// One row returned by the slot: the change position and its hex payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub lsn: Lsn,
    pub data: String,
}

impl RawChange {
    pub fn new(lsn: impl Into<Lsn>, data: impl Into<String>) -> Self {
        Self {
            lsn: lsn.into(),
            data: data.into(),
        }
    }
}

/// Source of pgoutput changes for a single replication slot.
pub trait ChangeSource: Send + Sync {
    /// Fetch up to roughly `max_changes` changes following `after`, in
    /// stream order. Transactions are never split, so the result may exceed
    /// the bound. An empty result means the slot has nothing new.
    fn pull(
        &self,
        after: Lsn,
        max_changes: u32,
    ) -> impl Future<Output = PgResult<Vec<RawChange>>> + Send;

    /// Confirm everything up to `to`, returning the position the upstream
    /// actually reached.
    fn advance(&self, to: Lsn) -> impl Future<Output = PgResult<Lsn>> + Send;
}

/// Configuration for [`PgSlotSource`].
#[derive(Debug, Clone)]
pub struct SlotSourceConfig {
    pub connection_string: String,
    pub slot_name: String,
    pub publication: String,
}

/// Reads a pgoutput slot through the SQL replication functions.
///
/// Changes are peeked rather than consumed, so nothing leaves the slot until
/// [`ChangeSource::advance`] confirms it. A peek always starts at the slot's
/// confirmed position.
pub struct PgSlotSource {
    client: Client,
    config: SlotSourceConfig,
}

impl PgSlotSource {
    pub async fn connect(config: SlotSourceConfig) -> PgResult<Self> {
        info!(slot = %config.slot_name, publication = %config.publication, "Connecting to Postgres");
        let client = connect_postgres(&config.connection_string).await?;
        Ok(Self { client, config })
    }

    pub fn from_client(client: Client, config: SlotSourceConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn slot_name(&self) -> &str {
        &self.config.slot_name
    }

    /// The slot's `confirmed_flush_lsn`.
    pub async fn confirmed_position(&self) -> PgResult<Option<Lsn>> {
        match slot_info(&self.client, &self.config.slot_name).await? {
            Some(info) => Ok(info.confirmed_flush),
            None => Err(PgError::SlotNotFound(self.config.slot_name.clone())),
        }
    }
}

impl ChangeSource for PgSlotSource {
    async fn pull(&self, after: Lsn, max_changes: u32) -> PgResult<Vec<RawChange>> {
        let limit = i32::try_from(max_changes).unwrap_or(i32::MAX);

        let rows = self
            .client
            .query(
                "SELECT lsn::text, encode(data, 'hex') \
                 FROM pg_logical_slot_peek_binary_changes($1, NULL, $2, \
                 'proto_version', '1', 'publication_names', $3)",
                &[&self.config.slot_name, &limit, &self.config.publication],
            )
            .await?;

        let mut changes = Vec::with_capacity(rows.len());
        for row in rows {
            let lsn: String = row.get(0);
            let data: String = row.get(1);
            changes.push(RawChange {
                lsn: lsn.parse()?,
                data,
            });
        }

        if !changes.is_empty() {
            debug!(
                slot = %self.config.slot_name,
                after = %after,
                count = changes.len(),
                "Peeked changes"
            );
        }

        Ok(changes)
    }

    async fn advance(&self, to: Lsn) -> PgResult<Lsn> {
        let row = self
            .client
            .query_opt(
                "SELECT end_lsn::text FROM pg_replication_slot_advance($1, $2::text::pg_lsn)",
                &[&self.config.slot_name, &to.to_string()],
            )
            .await?;

        let confirmed = match row.and_then(|r| r.get::<_, Option<String>>(0)) {
            Some(lsn) => lsn.parse()?,
            None => to,
        };

        debug!(slot = %self.config.slot_name, requested = %to, confirmed = %confirmed, "Advanced slot");
        Ok(confirmed)
    }
}
