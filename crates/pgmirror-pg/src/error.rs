use pgmirror_state::StateError;
use thiserror::Error;

/// Message Postgres raises once the SQL replication interface has registered
/// too many relcache callbacks in one backend. Expected noise, retried silently.
const RELCACHE_EXHAUSTED: &str = "out of relcache_callback_list slots";

#[derive(Debug, Error)]
pub enum PgError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("replication slot '{0}' does not exist")]
    SlotNotFound(String),

    #[error("failed to create replication slot: {0}")]
    SlotCreationFailed(String),

    #[error("replication error: {0}")]
    Replication(String),

    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),

    #[error("unexpected message tag '{}' (0x{:02X}) while parsing replication message", *.0 as char, .0)]
    UnknownMessageTag(u8),

    #[error("buffer underrun at offset {offset}: needed {needed} hex chars, {available} available")]
    BufferUnderrun {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("malformed replication payload: {0}")]
    MalformedPayload(String),

    #[error("destination table '{0}' does not exist, but is included in replication stream")]
    UnknownTable(String),

    #[error("tuple for table '{table}' has {actual} columns, destination layout has {expected}")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("value conversion failed: {0}")]
    Conversion(#[from] pgmirror_core::Error),

    #[error("destination write failed: {0}")]
    Destination(String),

    #[error("metadata error: {0}")]
    State(#[from] StateError),
}

impl PgError {
    /// Errors that abort the whole poll and surface to the caller.
    ///
    /// Protocol violations and mapping gaps cannot be fixed by retrying the
    /// same records; everything else is logged and retried next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PgError::UnknownMessageTag(_)
                | PgError::BufferUnderrun { .. }
                | PgError::MalformedPayload(_)
                | PgError::UnknownTable(_)
                | PgError::ColumnCountMismatch { .. }
        )
    }

    /// Whether this is the relcache callback exhaustion raised by the SQL
    /// replication functions.
    pub fn is_relcache_exhaustion(&self) -> bool {
        matches!(self, PgError::Postgres(msg) if msg.contains(RELCACHE_EXHAUSTED))
    }
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let msg = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            PgError::Postgres(msg)
        } else {
            PgError::Postgres(e.to_string())
        }
    }
}

pub type PgResult<T> = Result<T, PgError>;
