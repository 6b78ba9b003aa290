use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("no tables configured")]
    NoTables,

    #[error("table '{name}' is configured more than once")]
    DuplicateTable { name: String },

    #[error("table '{table}' has no columns")]
    NoColumns { table: String },

    #[error("column '{column}' appears more than once in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("id column '{column}' is not among the columns of table '{table}'")]
    IdColumnNotInColumns { table: String, column: String },

    #[error("column '{column}' in table '{table}' is named like a synthetic column")]
    ReservedColumn { table: String, column: String },

    #[error("array column '{column}' in table '{table}' requires 'element'")]
    MissingArrayElement { table: String, column: String },

    #[error("array column '{column}' in table '{table}' cannot hold arrays")]
    NestedArray { table: String, column: String },

    #[error("invalid type for column '{column}' in table '{table}': {source}")]
    InvalidColumnType {
        table: String,
        column: String,
        #[source]
        source: pgmirror_core::Error,
    },

    #[error("max_block_size must be a positive integer")]
    InvalidMaxBlockSize,
}

pub type ConfigResult<T> = Result<T, ConfigError>;
