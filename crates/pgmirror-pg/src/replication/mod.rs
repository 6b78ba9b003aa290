//! Logical replication over the SQL interface with the pgoutput plugin.
//!
//! Changes are peeked from a slot as hex-encoded pgoutput messages, decoded
//! into per-table change buffers and checkpointed into a destination store.

pub mod consumer;
pub mod decoder;
pub mod hex_reader;
pub mod lsn;
pub mod pgoutput;
pub mod publication;
pub mod relation_cache;
pub mod slot;
pub mod source;
pub mod sync;

pub use consumer::{ConsumeOutcome, ReplicaConsumer, DEFAULT_MAX_BLOCK_SIZE};
pub use decoder::{DecoderMark, MessageDecoder};
pub use hex_reader::HexReader;
pub use lsn::{format_lsn, parse_lsn, Lsn};
pub use pgoutput::PgOutputMessage;
pub use publication::{drop_publication, ensure_publication, quote_ident, TableRef};
pub use relation_cache::{RelationCache, RelationInfo, SchemaStatus};
pub use slot::{create_slot, drop_slot, ensure_slot, slot_exists, slot_info, SlotInfo};
pub use source::{ChangeSource, PgSlotSource, RawChange, SlotSourceConfig};
pub use sync::{SyncCoordinator, SyncReport};
