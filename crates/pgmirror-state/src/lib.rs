//! Durable replication metadata: the last confirmed position of a slot and
//! the version counter stamped on every buffered row.

mod error;
mod memory;
mod metadata;
mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{StateError, StateResult};
pub use memory::MemoryMetadataStore;
pub use metadata::{Metadata, INITIAL_VERSION};
pub use sqlite::SqliteMetadataStore;

/// Persisted checkpoint for one replication slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The last position confirmed by the upstream slot.
    pub lsn: u64,
    /// Version to stamp on rows buffered after this checkpoint.
    pub version: u64,
    /// Last update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Trait for metadata storage backends.
pub trait MetadataStore: Send + Sync {
    /// Get the checkpoint for a slot.
    fn load(&self, slot_name: &str) -> StateResult<Option<Checkpoint>>;

    /// Save the checkpoint for a slot, replacing any previous one.
    fn save(&self, slot_name: &str, checkpoint: &Checkpoint) -> StateResult<()>;

    /// Remove the checkpoint for a slot.
    fn clear(&self, slot_name: &str) -> StateResult<()>;

    /// Get all checkpoints.
    fn all(&self) -> StateResult<Vec<(String, Checkpoint)>>;
}
