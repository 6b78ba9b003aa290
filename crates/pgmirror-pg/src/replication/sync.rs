//! Checkpoint/sync: flush buffered tables, then advance and persist the
//! replay position.

use pgmirror_core::{RowSet, TableStore};
use pgmirror_state::{Metadata, MetadataStore};
use tracing::{debug, error, info};

use super::decoder::MessageDecoder;
use super::lsn::Lsn;
use super::source::ChangeSource;
use crate::error::{PgError, PgResult};

/// Result of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Tables written and checkpointed, with their row counts.
    pub flushed: Vec<(String, usize)>,
    /// Tables whose checkpoint failed; their rows stay buffered.
    pub failed: Vec<String>,
    /// Confirmed position after the pass.
    pub confirmed: Lsn,
}

impl SyncReport {
    pub fn rows_flushed(&self) -> usize {
        self.flushed.iter().map(|(_, n)| n).sum()
    }
}

/// Ties destination writes to slot advances.
///
/// Each dirty table is checkpointed on its own: write its rows, persist
/// position and version, then advance the slot to the last committed
/// position. The buffer is cleared only when all three succeed, so a failure
/// at any step leaves the rows for the next pass. The slot only moves once
/// the position it moves to is persisted.
#[derive(Debug)]
pub struct SyncCoordinator {
    confirmed: Lsn,
}

impl SyncCoordinator {
    pub fn new(confirmed: Lsn) -> Self {
        Self { confirmed }
    }

    /// Last position confirmed by the upstream.
    pub fn confirmed(&self) -> Lsn {
        self.confirmed
    }

    /// Record a position confirmed outside a sync pass.
    pub fn observe(&mut self, confirmed: Lsn) {
        self.confirmed = self.confirmed.max(confirmed);
    }

    pub async fn sync<T, C, S>(
        &mut self,
        decoder: &mut MessageDecoder,
        store: &T,
        source: &C,
        metadata: &mut Metadata<S>,
    ) -> SyncReport
    where
        T: TableStore,
        C: ChangeSource,
        S: MetadataStore,
    {
        let mut report = SyncReport::default();

        let Some(candidate) = decoder.final_lsn() else {
            debug!("No committed transaction decoded yet, skipping sync");
            report.confirmed = self.confirmed;
            return report;
        };

        let dirty: Vec<String> = decoder
            .buffers()
            .filter(|b| !b.is_empty())
            .map(|b| b.table().to_string())
            .collect();

        if dirty.is_empty() {
            // Nothing to write, but committed transactions still move the slot
            if candidate > self.confirmed {
                match self.checkpoint(None, candidate, store, source, metadata).await {
                    Ok(confirmed) => self.observe(confirmed),
                    Err(e) => error!(lsn = %candidate, error = %e, "Failed to advance slot"),
                }
            }
        }

        for table in dirty {
            let Some(rows) = decoder.buffer(&table).map(|b| b.snapshot()) else {
                continue;
            };
            let count = rows.num_rows();

            match self.checkpoint(Some(rows), candidate, store, source, metadata).await {
                Ok(confirmed) => {
                    self.observe(confirmed);
                    if let Some(buffer) = decoder.buffer_mut(&table) {
                        buffer.clear();
                    }
                    info!(table = %table, rows = count, lsn = %self.confirmed, "Flushed table");
                    report.flushed.push((table, count));
                }
                Err(e) => {
                    error!(table = %table, rows = count, error = %e, "Failed to flush table, keeping rows for retry");
                    report.failed.push(table);
                }
            }
        }

        decoder.clear_pending();
        report.confirmed = self.confirmed;
        report
    }

    /// Write `rows` (if any), persist the checkpoint, then advance the slot.
    async fn checkpoint<T, C, S>(
        &self,
        rows: Option<RowSet>,
        candidate: Lsn,
        store: &T,
        source: &C,
        metadata: &mut Metadata<S>,
    ) -> PgResult<Lsn>
    where
        T: TableStore,
        C: ChangeSource,
        S: MetadataStore,
    {
        if let Some(rows) = rows {
            store
                .insert(rows)
                .await
                .map_err(|e| PgError::Destination(e.to_string()))?;
        }

        let target = candidate.max(self.confirmed);
        metadata.commit(target.as_u64())?;

        // Moving a slot backwards is an error upstream
        if target > self.confirmed {
            source.advance(target).await
        } else {
            Ok(self.confirmed)
        }
    }
}
