use crate::error::Result;
use crate::types::{ColumnType, Value};

/// Name of the synthetic change-sign column appended to every buffered row.
pub const SIGN_COLUMN: &str = "_sign";
/// Name of the synthetic version column appended to every buffered row.
pub const VERSION_COLUMN: &str = "_version";

/// A destination column: name, semantic type and nullability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    /// Mark the column as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Convert a text value sent by the source.
    pub fn convert(&self, text: &str) -> Result<Value> {
        self.column_type.parse_text(&self.name, text)
    }

    /// Value written when the source sends NULL.
    pub fn null_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.column_type.default_value()
        }
    }
}

/// Column layout of one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    /// Destination table name; matches the upstream relation name.
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Column used by replace-by-version destinations to identify a row.
    pub id_column: Option<String>,
}

impl TableLayout {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            id_column: None,
        }
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    /// Number of source columns (synthetic columns excluded).
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Explicit target column list for inserts, synthetic columns included.
    pub fn target_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.name.clone())
            .chain([SIGN_COLUMN.to_string(), VERSION_COLUMN.to_string()])
            .collect()
    }

    /// Position of the id column, if configured and present.
    pub fn id_index(&self) -> Option<usize> {
        let id = self.id_column.as_deref()?;
        self.columns.iter().position(|c| c.name == id)
    }
}
