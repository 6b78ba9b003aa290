mod connect;
mod error;
pub mod replication;

pub use connect::connect_postgres;
pub use error::{PgError, PgResult};
pub use replication::{
    drop_slot, ensure_publication, ensure_slot, format_lsn, parse_lsn, slot_info, ChangeSource,
    ConsumeOutcome, Lsn, MessageDecoder, PgSlotSource, RawChange, ReplicaConsumer,
    SlotSourceConfig, SyncCoordinator, SyncReport, TableRef,
};
