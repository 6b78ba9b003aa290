use thiserror::Error;

/// Errors from destination writes.
#[derive(Debug, Error)]
pub enum TpError {
    #[error("network error: {0}")]
    Network(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("table '{0}' has no id column configured")]
    MissingIdColumn(String),

    #[error("unsupported id value in table '{table}': {value}")]
    InvalidId { table: String, value: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("rs-puff error: {0}")]
    RsPuff(String),
}

impl TpError {
    /// Check if retrying the same write can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TpError::Network(_) | TpError::RsPuff(_))
    }
}

pub type TpResult<T> = Result<T, TpError>;
