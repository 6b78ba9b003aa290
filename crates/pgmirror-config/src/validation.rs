use std::collections::HashSet;

use pgmirror_core::{ColumnDef, ColumnType, TableLayout, SIGN_COLUMN, VERSION_COLUMN};

use crate::error::{ConfigError, ConfigResult};
use crate::project::{ColumnConfig, DestinationKind, ProjectConfig, TableConfig};

/// Validate a project configuration.
pub fn validate_project(config: &ProjectConfig) -> ConfigResult<()> {
    validate_replication(config)?;
    validate_destination(config)?;
    validate_tables(config)?;
    Ok(())
}

fn validate_replication(config: &ProjectConfig) -> ConfigResult<()> {
    if config.replication.max_block_size == 0 {
        return Err(ConfigError::InvalidMaxBlockSize);
    }
    Ok(())
}

fn validate_destination(config: &ProjectConfig) -> ConfigResult<()> {
    if config.destination.kind != DestinationKind::Turbopuffer {
        return Ok(());
    }

    if config.destination.api_key.is_none() {
        return Err(ConfigError::MissingField {
            field: "destination.api_key".to_string(),
        });
    }

    // Replace-by-version needs a row identity
    for table in &config.tables {
        if table.id_column.is_none() {
            return Err(ConfigError::MissingField {
                field: format!("tables.{}.id_column", table.name),
            });
        }
    }
    Ok(())
}

fn validate_tables(config: &ProjectConfig) -> ConfigResult<()> {
    if config.tables.is_empty() {
        return Err(ConfigError::NoTables);
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        if !seen.insert(table.name.as_str()) {
            return Err(ConfigError::DuplicateTable {
                name: table.name.clone(),
            });
        }
        validate_table(table)?;
    }
    Ok(())
}

fn validate_table(table: &TableConfig) -> ConfigResult<()> {
    if table.columns.is_empty() {
        return Err(ConfigError::NoColumns {
            table: table.name.clone(),
        });
    }

    let mut seen = HashSet::new();
    for column in &table.columns {
        if column.name == SIGN_COLUMN || column.name == VERSION_COLUMN {
            return Err(ConfigError::ReservedColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        if !seen.insert(column.name.as_str()) {
            return Err(ConfigError::DuplicateColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        column_type(&table.name, column)?;
    }

    if let Some(id) = &table.id_column {
        if !seen.contains(id.as_str()) {
            return Err(ConfigError::IdColumnNotInColumns {
                table: table.name.clone(),
                column: id.clone(),
            });
        }
    }
    Ok(())
}

/// Resolve the semantic type of a configured column.
fn column_type(table: &str, column: &ColumnConfig) -> ConfigResult<ColumnType> {
    let invalid = |source: pgmirror_core::Error| ConfigError::InvalidColumnType {
        table: table.to_string(),
        column: column.name.clone(),
        source,
    };

    if !column.column_type.eq_ignore_ascii_case("array") {
        return column.column_type.parse().map_err(invalid);
    }

    let element = column
        .element
        .as_deref()
        .ok_or_else(|| ConfigError::MissingArrayElement {
            table: table.to_string(),
            column: column.name.clone(),
        })?;
    if element.eq_ignore_ascii_case("array") {
        return Err(ConfigError::NestedArray {
            table: table.to_string(),
            column: column.name.clone(),
        });
    }

    let element: ColumnType = element.parse().map_err(invalid)?;
    Ok(ColumnType::array_of(element))
}

/// Convert one table config to its destination layout.
pub fn to_layout(table: &TableConfig) -> ConfigResult<TableLayout> {
    validate_table(table)?;

    let columns = table
        .columns
        .iter()
        .map(|c| {
            let def = ColumnDef::new(&c.name, column_type(&table.name, c)?);
            Ok(if c.nullable { def.nullable() } else { def })
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    let layout = TableLayout::new(&table.name, columns);
    Ok(match &table.id_column {
        Some(id) => layout.with_id_column(id),
        None => layout,
    })
}

/// Validate a project config and build the layouts of all its tables.
pub fn to_layouts(config: &ProjectConfig) -> ConfigResult<Vec<TableLayout>> {
    validate_project(config)?;
    config.tables.iter().map(to_layout).collect()
}
