use thiserror::Error;

/// Errors that can occur in pgmirror-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for column '{column}' of type {expected}: {value:?}")]
    InvalidValue {
        column: String,
        expected: String,
        value: String,
    },

    #[error("row has {actual} values but table '{table}' has {expected} columns")]
    RowWidthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown column type: {0}")]
    UnknownColumnType(String),

    #[error("malformed array literal: {0}")]
    MalformedArray(String),
}

pub type Result<T> = std::result::Result<T, Error>;
