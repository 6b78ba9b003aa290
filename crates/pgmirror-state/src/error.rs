use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("state store lock poisoned")]
    Poisoned,

    #[error("invalid stored value: {0}")]
    InvalidValue(String),

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

pub type StateResult<T> = Result<T, StateError>;
