pub mod buffer;
pub mod convert;
pub mod error;
pub mod layout;
pub mod store;
pub mod types;

pub use buffer::{ChangeBuffer, RowSet, Sign};
pub use convert::split_array_literal;
pub use error::{Error, Result};
pub use layout::{ColumnDef, TableLayout, SIGN_COLUMN, VERSION_COLUMN};
pub use store::TableStore;
pub use types::{ColumnType, Value};
