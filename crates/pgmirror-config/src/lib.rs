mod error;
mod project;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use project::{
    resolve_env, ColumnConfig, DestinationConfig, DestinationKind, PostgresConfig, ProjectConfig,
    ReplicationConfig, StateConfig, TableConfig,
};
pub use validation::{to_layout, to_layouts, validate_project};
