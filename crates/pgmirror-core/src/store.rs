use std::future::Future;

use crate::buffer::RowSet;

/// Destination table store.
///
/// An insert is all-or-nothing: either every row of the row set is durably
/// written, or none is and an error is returned.
pub trait TableStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write a row set into the table named by `rows.table`.
    /// Returns the number of rows written.
    fn insert(&self, rows: RowSet) -> impl Future<Output = Result<usize, Self::Error>> + Send;
}
