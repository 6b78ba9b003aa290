use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use pgmirror_core::{RowSet, TableStore};

use crate::error::{TpError, TpResult};

/// In-memory destination store for tests.
///
/// Records every accepted row set per table; tables can be switched to fail.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    inserts: HashMap<String, Vec<RowSet>>,
    failing: HashSet<String>,
    attempts: usize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts into `table` fail (or succeed again).
    pub fn set_failing(&self, table: impl Into<String>, fail: bool) {
        let mut state = self.state.lock().unwrap();
        let table = table.into();
        if fail {
            state.failing.insert(table);
        } else {
            state.failing.remove(&table);
        }
    }

    /// Row sets accepted for `table`, in insert order.
    pub fn inserts(&self, table: &str) -> Vec<RowSet> {
        let state = self.state.lock().unwrap();
        state.inserts.get(table).cloned().unwrap_or_default()
    }

    /// Total rows accepted for `table`.
    pub fn rows(&self, table: &str) -> usize {
        self.inserts(table).iter().map(RowSet::num_rows).sum()
    }

    /// Number of insert calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.inserts.clear();
        state.attempts = 0;
    }
}

impl TableStore for MockStore {
    type Error = TpError;

    fn insert(&self, rows: RowSet) -> impl Future<Output = TpResult<usize>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state
                .lock()
                .map_err(|_| TpError::Validation("mock store lock poisoned".to_string()))?;
            state.attempts += 1;

            if state.failing.contains(&rows.table) {
                return Err(TpError::Network(format!("insert into '{}' failed", rows.table)));
            }

            let count = rows.num_rows();
            state.inserts.entry(rows.table.clone()).or_default().push(rows);
            Ok(count)
        }
    }
}
