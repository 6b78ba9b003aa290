use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Project configuration as parsed from `pgmirror.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub state: StateConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl ProjectConfig {
    /// Parse a project config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: ProjectConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// The Postgres connection string with `${VAR}` references resolved.
    pub fn postgres_connection_string(&self) -> ConfigResult<String> {
        resolve_env(&self.postgres.connection_string)
    }

    /// The destination API key with `${VAR}` references resolved.
    pub fn destination_api_key(&self) -> ConfigResult<String> {
        let key = self
            .destination
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField {
                field: "destination.api_key".to_string(),
            })?;
        resolve_env(key)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Replication slot and polling settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default = "default_slot")]
    pub slot: String,
    #[serde(default = "default_publication")]
    pub publication: String,
    /// Upper bound on changes returned by one peek.
    #[serde(default = "default_max_block_size")]
    pub max_block_size: u32,
    /// Sleep between polls that made no progress.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Create the slot during setup if it does not exist.
    #[serde(default = "default_create_slot")]
    pub create_slot: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            slot: default_slot(),
            publication: default_publication(),
            max_block_size: default_max_block_size(),
            poll_interval_ms: default_poll_interval_ms(),
            create_slot: default_create_slot(),
        }
    }
}

fn default_slot() -> String {
    "pgmirror".to_string()
}

fn default_publication() -> String {
    "pgmirror_pub".to_string()
}

fn default_max_block_size() -> u32 {
    8192
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_create_slot() -> bool {
    true
}

/// Where checkpoint metadata is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> String {
    "pgmirror_state.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    pub kind: DestinationKind,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// turbopuffer namespaces, one per table.
    Turbopuffer,
    /// In-process store, nothing leaves the process.
    Memory,
}

/// One replicated table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    /// Relation name upstream, also the buffer key.
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Destination name; defaults to `name`.
    pub namespace: Option<String>,
    pub id_column: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

impl TableConfig {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(&self.name)
    }
}

fn default_schema() -> String {
    "public".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub nullable: bool,
    /// Element type, for `array` columns only.
    pub element: Option<String>,
}

/// Resolve environment variables in a string.
/// Supports ${VAR_NAME} syntax.
pub fn resolve_env(s: &str) -> ConfigResult<String> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        let value =
            std::env::var(var_name).map_err(|_| ConfigError::MissingEnvVar(var_name.to_string()))?;
        result.push_str(&rest[..start]);
        result.push_str(&value);
        rest = &rest[start + end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
