use chrono::Utc;
use tracing::{debug, info};

use crate::error::StateResult;
use crate::{Checkpoint, MetadataStore};

/// Version assigned to rows when no checkpoint has been persisted yet.
pub const INITIAL_VERSION: u64 = 1;

/// In-memory view of a slot's persisted checkpoint.
///
/// Every row buffered between two commits carries the same `version()`; a
/// successful `commit` persists the confirmed position and bumps the version,
/// so rows from later intervals always compare greater.
#[derive(Debug)]
pub struct Metadata<S> {
    store: S,
    slot_name: String,
    lsn: Option<u64>,
    version: u64,
}

impl<S: MetadataStore> Metadata<S> {
    /// Load the checkpoint for `slot_name`, starting fresh when none exists.
    pub fn load(store: S, slot_name: impl Into<String>) -> StateResult<Self> {
        let slot_name = slot_name.into();
        let (lsn, version) = match store.load(&slot_name)? {
            Some(checkpoint) => {
                info!(
                    slot = %slot_name,
                    lsn = checkpoint.lsn,
                    version = checkpoint.version,
                    "Loaded replication checkpoint"
                );
                (Some(checkpoint.lsn), checkpoint.version.max(INITIAL_VERSION))
            }
            None => (None, INITIAL_VERSION),
        };

        Ok(Self {
            store,
            slot_name,
            lsn,
            version,
        })
    }

    /// Version to stamp on rows buffered in the current interval.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Last persisted position, if any.
    pub fn lsn(&self) -> Option<u64> {
        self.lsn
    }

    pub fn slot_name(&self) -> &str {
        &self.slot_name
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist `confirmed_lsn` together with the next version.
    ///
    /// The in-memory view only changes once the store accepted the write.
    pub fn commit(&mut self, confirmed_lsn: u64) -> StateResult<()> {
        let next = Checkpoint {
            lsn: confirmed_lsn,
            version: self.version + 1,
            updated_at: Some(Utc::now()),
        };

        self.store.save(&self.slot_name, &next)?;

        debug!(
            slot = %self.slot_name,
            lsn = next.lsn,
            version = next.version,
            "Committed replication checkpoint"
        );
        self.lsn = Some(next.lsn);
        self.version = next.version;
        Ok(())
    }
}
