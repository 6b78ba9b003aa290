use crate::error::{Error, Result};
use crate::layout::TableLayout;
use crate::types::Value;

/// Direction of a buffered row in the change log.
///
/// Destinations collapse rows by key and version; a `Negative` row cancels
/// the row it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Insert, or the new image of an update.
    Positive,
    /// Delete, or the old image of an update.
    Negative,
}

impl Sign {
    pub fn as_i8(self) -> i8 {
        match self {
            Sign::Positive => 1,
            Sign::Negative => -1,
        }
    }
}

/// Column-oriented accumulator of decoded changes for one destination table.
///
/// Rows are appended whole, so every column vector always has the same length.
#[derive(Debug, Clone)]
pub struct ChangeBuffer {
    layout: TableLayout,
    columns: Vec<Vec<Value>>,
    signs: Vec<i8>,
    versions: Vec<u64>,
}

impl ChangeBuffer {
    pub fn new(layout: TableLayout) -> Self {
        let columns = vec![Vec::new(); layout.width()];
        Self {
            layout,
            columns,
            signs: Vec::new(),
            versions: Vec::new(),
        }
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn table(&self) -> &str {
        &self.layout.name
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }

    /// Append one complete row plus its sign and version.
    pub fn push_row(&mut self, values: Vec<Value>, sign: Sign, version: u64) -> Result<()> {
        if values.len() != self.layout.width() {
            return Err(Error::RowWidthMismatch {
                table: self.layout.name.clone(),
                expected: self.layout.width(),
                actual: values.len(),
            });
        }

        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value);
        }
        self.signs.push(sign.as_i8());
        self.versions.push(version);
        Ok(())
    }

    /// Drop all buffered rows, keeping the layout.
    pub fn clear(&mut self) {
        self.columns = vec![Vec::new(); self.layout.width()];
        self.signs.clear();
        self.versions.clear();
    }

    /// Drop rows appended after the first `len` rows.
    pub fn truncate(&mut self, len: usize) {
        for column in &mut self.columns {
            column.truncate(len);
        }
        self.signs.truncate(len);
        self.versions.truncate(len);
    }

    /// Copy the buffered rows into a row set without draining the buffer.
    ///
    /// The buffer is only cleared once the destination write and the position
    /// advance both succeed, so a failed sync can be retried from the same rows.
    pub fn snapshot(&self) -> RowSet {
        let mut columns = self.columns.clone();
        columns.push(self.signs.iter().map(|s| Value::Int((*s).into())).collect());
        columns.push(self.versions.iter().map(|v| Value::UInt(*v)).collect());

        RowSet {
            table: self.layout.name.clone(),
            column_names: self.layout.target_columns(),
            id_column: self.layout.id_column.clone(),
            columns,
        }
    }

    /// Signs of the buffered rows, in append order.
    pub fn signs(&self) -> &[i8] {
        &self.signs
    }

    /// Versions of the buffered rows, in append order.
    pub fn versions(&self) -> &[u64] {
        &self.versions
    }

    /// Values of one source column, in append order.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let idx = self.layout.columns.iter().position(|c| c.name == name)?;
        Some(&self.columns[idx])
    }
}

/// A materialized block of buffered rows, ready for a destination insert.
///
/// `columns` follows `column_names`; the last two columns are always the
/// change sign and the version.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub table: String,
    pub column_names: Vec<String>,
    pub id_column: Option<String>,
    pub columns: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Values of the row at `idx`, in column order.
    pub fn row(&self, idx: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c[idx]).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let idx = self.column_names.iter().position(|c| c == name)?;
        Some(&self.columns[idx])
    }

    /// Change sign of the row at `idx`.
    pub fn sign(&self, idx: usize) -> i8 {
        let signs = &self.columns[self.columns.len() - 2];
        signs[idx].as_i64().map_or(1, |s| if s < 0 { -1 } else { 1 })
    }

    /// Version of the row at `idx`.
    pub fn version(&self, idx: usize) -> u64 {
        let versions = &self.columns[self.columns.len() - 1];
        versions[idx].as_u64().unwrap_or_default()
    }
}
