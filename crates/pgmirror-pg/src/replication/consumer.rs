//! Consumer loop: one bounded pull, decode, sync per call.

use std::collections::BTreeSet;

use pgmirror_core::{TableLayout, TableStore};
use pgmirror_state::{Metadata, MetadataStore};
use tracing::{debug, info, warn};

use super::decoder::MessageDecoder;
use super::lsn::Lsn;
use super::source::{ChangeSource, RawChange};
use super::sync::{SyncCoordinator, SyncReport};
use crate::error::{PgError, PgResult};

/// Default `upto_nchanges` bound for each pull.
pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 8192;

/// What one `consume` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeOutcome {
    /// New changes were decoded and no table is quarantined.
    pub made_progress: bool,
    /// Tables quarantined by schema drift, needing an out-of-band resync.
    pub quarantined_tables: BTreeSet<String>,
    /// Records returned by the pull.
    pub records: usize,
    /// Rows appended to the change buffers.
    pub rows_buffered: usize,
    pub sync: Option<SyncReport>,
}

/// Drives a replication session: pull from the slot, decode into change
/// buffers, checkpoint into the destination.
///
/// The decoder state (relation cache, skip list, buffers) lives for the
/// lifetime of the consumer; one `consume` runs to completion before the
/// next starts.
pub struct ReplicaConsumer<C, T, S> {
    source: C,
    store: T,
    metadata: Metadata<S>,
    decoder: MessageDecoder,
    coordinator: SyncCoordinator,
    max_block_size: u32,
    /// Records past the confirmed position that are already decoded. The
    /// slot is peeked, so they come back on every pull until it advances.
    replayed: usize,
    /// Position of the first record of the peek `replayed` counts into.
    replay_head: Option<Lsn>,
}

impl<C, T, S> ReplicaConsumer<C, T, S>
where
    C: ChangeSource,
    T: TableStore,
    S: MetadataStore,
{
    pub fn new(
        source: C,
        store: T,
        metadata: Metadata<S>,
        layouts: impl IntoIterator<Item = TableLayout>,
    ) -> Self {
        let confirmed = metadata.lsn().map(Lsn).unwrap_or_default();
        Self {
            source,
            store,
            metadata,
            decoder: MessageDecoder::new(layouts),
            coordinator: SyncCoordinator::new(confirmed),
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            replayed: 0,
            replay_head: None,
        }
    }

    pub fn with_max_block_size(mut self, max_block_size: u32) -> Self {
        self.max_block_size = max_block_size.max(1);
        self
    }

    /// Move the slot to the persisted position before the first poll.
    ///
    /// A failure is logged: the slot may already be past it.
    pub async fn resume(&mut self) {
        let Some(lsn) = self.metadata.lsn().map(Lsn) else {
            info!(slot = %self.metadata.slot_name(), "No persisted position, starting from slot");
            return;
        };

        match self.source.advance(lsn).await {
            Ok(confirmed) => {
                self.coordinator.observe(confirmed);
                info!(slot = %self.metadata.slot_name(), lsn = %confirmed, "Resumed from persisted position");
            }
            Err(e) => {
                warn!(slot = %self.metadata.slot_name(), lsn = %lsn, error = %e, "Could not re-advance slot to persisted position");
            }
        }
    }

    /// Run one poll cycle.
    ///
    /// Protocol violations and unknown tables are returned as errors. Any
    /// other failure is logged and reported as no progress, leaving the
    /// confirmed position unchanged.
    pub async fn consume(&mut self) -> PgResult<ConsumeOutcome> {
        let mut outcome = ConsumeOutcome {
            quarantined_tables: self.decoder.quarantined_tables().clone(),
            ..Default::default()
        };

        let records = match self
            .source
            .pull(self.coordinator.confirmed(), self.max_block_size)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                Self::contain(e)?;
                return Ok(outcome);
            }
        };

        outcome.records = records.len();
        if records.is_empty() {
            debug!("Slot is empty");
            self.replayed = 0;
            // Rows kept from a failed flush get another attempt
            if self.decoder.buffers().any(|b| !b.is_empty()) {
                let report = self
                    .coordinator
                    .sync(&mut self.decoder, &self.store, &self.source, &mut self.metadata)
                    .await;
                outcome.sync = Some(report);
            }
            return Ok(outcome);
        }

        // A peek that starts elsewhere means the slot moved
        let head = records[0].lsn;
        if self.replay_head != Some(head) {
            self.replayed = 0;
        }

        let skip = self.replayed.min(records.len());
        let fresh = &records[skip..];
        match self.decode_batch(fresh) {
            Ok(rows) => {
                outcome.rows_buffered = rows;
                self.replayed = records.len();
                self.replay_head = Some(head);
            }
            Err(e) => {
                Self::contain(e)?;
                return Ok(outcome);
            }
        }

        let before = self.coordinator.confirmed();
        let report = self
            .coordinator
            .sync(&mut self.decoder, &self.store, &self.source, &mut self.metadata)
            .await;
        if report.confirmed > before {
            self.replayed = 0;
        }

        outcome.quarantined_tables = self.decoder.quarantined_tables().clone();
        outcome.made_progress = !fresh.is_empty() && outcome.quarantined_tables.is_empty();

        info!(
            records = outcome.records,
            decoded = fresh.len(),
            rows = outcome.rows_buffered,
            flushed = report.rows_flushed(),
            failed = report.failed.len(),
            lsn = %report.confirmed,
            "Poll cycle complete"
        );

        outcome.sync = Some(report);
        Ok(outcome)
    }

    /// Decode a batch in order, undoing all of it if any record fails.
    fn decode_batch(&mut self, records: &[RawChange]) -> PgResult<usize> {
        let mark = self.decoder.mark();
        let version = self.metadata.version();

        let mut rows = 0;
        for record in records {
            match self.decoder.decode(&record.data, version) {
                Ok(n) => rows += n,
                Err(e) => {
                    debug!(lsn = %record.lsn, error = %e, "Failed to decode record");
                    self.decoder.rollback(mark);
                    return Err(e);
                }
            }
        }
        Ok(rows)
    }

    /// Propagate fatal errors, log the rest.
    fn contain(e: PgError) -> PgResult<()> {
        if e.is_fatal() {
            return Err(e);
        }
        if !e.is_relcache_exhaustion() {
            warn!(error = %e, "Poll failed, retrying next cycle");
        }
        Ok(())
    }

    pub fn decoder(&self) -> &MessageDecoder {
        &self.decoder
    }

    pub fn metadata(&self) -> &Metadata<S> {
        &self.metadata
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn confirmed(&self) -> Lsn {
        self.coordinator.confirmed()
    }
}
