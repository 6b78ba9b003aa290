use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use pgmirror_config::{validate_project, ProjectConfig};
use pgmirror_pg::TableRef;

/// Default config file name.
pub const CONFIG_FILE: &str = "pgmirror.toml";

/// Read, parse and validate the project config.
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = ProjectConfig::parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    validate_project(&config).with_context(|| format!("Invalid config: {}", path.display()))?;

    Ok(config)
}

/// Upstream tables to publish, in config order.
pub fn publication_tables(config: &ProjectConfig) -> Vec<TableRef> {
    config
        .tables
        .iter()
        .map(|t| TableRef::new(&t.schema, &t.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[postgres]
connection_string = "postgres://localhost/app"

[destination]
kind = "memory"

[[tables]]
name = "orders"
schema = "sales"
columns = [{ name = "id", type = "int32" }]

[[tables]]
name = "items"
columns = [{ name = "id", type = "int64" }]
"#;

    #[test]
    fn test_load_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, CONFIG).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.tables.len(), 2);
        assert_eq!(
            publication_tables(&config),
            vec![TableRef::new("sales", "orders"), TableRef::new("public", "items")]
        );
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, CONFIG.replace("int64", "geometry")).unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }
}
