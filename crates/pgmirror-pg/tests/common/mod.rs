#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use pgmirror_core::{ColumnDef, ColumnType, TableLayout};
use pgmirror_pg::{ChangeSource, Lsn, PgError, PgResult, RawChange};

/// Builds hex-encoded pgoutput payloads.
#[derive(Debug, Clone)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(tag: u8) -> Self {
        Payload(vec![tag])
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    pub fn i16(mut self, v: i16) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn string(mut self, s: &str) -> Self {
        self.0.extend_from_slice(s.as_bytes());
        self.0.push(0);
        self
    }

    /// Tuple data: `Some` is a text column, `None` a null.
    pub fn tuple(mut self, values: &[Option<&str>]) -> Self {
        self = self.i16(values.len() as i16);
        for value in values {
            self = match value {
                Some(text) => {
                    let mut p = self.u8(b't').i32(text.len() as i32);
                    p.0.extend_from_slice(text.as_bytes());
                    p
                }
                None => self.u8(b'n'),
            };
        }
        self
    }

    pub fn hex(&self) -> String {
        format!("\\x{}", hex::encode(&self.0))
    }
}

pub fn begin(final_lsn: u64, xid: u32) -> String {
    Payload::new(b'B')
        .i64(final_lsn as i64)
        .i64(0)
        .i32(xid as i32)
        .hex()
}

pub fn commit(end_lsn: u64) -> String {
    Payload::new(b'C')
        .u8(0)
        .i64(end_lsn.saturating_sub(16) as i64)
        .i64(end_lsn as i64)
        .i64(0)
        .hex()
}

/// Relation message; `columns` are (name, type oid, type modifier).
pub fn relation(id: u32, name: &str, identity: u8, columns: &[(&str, u32, i32)]) -> String {
    let mut p = Payload::new(b'R')
        .i32(id as i32)
        .string("public")
        .string(name)
        .u8(identity)
        .i16(columns.len() as i16);
    for (col, oid, typmod) in columns {
        p = p.u8(0).string(col).i32(*oid as i32).i32(*typmod);
    }
    p.hex()
}

pub fn insert(id: u32, values: &[Option<&str>]) -> String {
    Payload::new(b'I').i32(id as i32).u8(b'N').tuple(values).hex()
}

/// Update with an optional old tuple marked `K` or `O`.
pub fn update(id: u32, old: Option<(u8, &[Option<&str>])>, new: &[Option<&str>]) -> String {
    let mut p = Payload::new(b'U').i32(id as i32);
    if let Some((marker, values)) = old {
        p = p.u8(marker).tuple(values);
    }
    p.u8(b'N').tuple(new).hex()
}

pub fn delete(id: u32, values: &[Option<&str>]) -> String {
    Payload::new(b'D').i32(id as i32).u8(b'K').tuple(values).hex()
}

pub const ORDERS_ID: u32 = 5;
pub const ITEMS_ID: u32 = 6;

pub fn orders_relation() -> String {
    relation(
        ORDERS_ID,
        "orders",
        b'd',
        &[("id", 23, -1), ("qty", 23, -1), ("label", 1043, 64)],
    )
}

pub fn items_relation() -> String {
    relation(ITEMS_ID, "items", b'd', &[("id", 20, -1), ("name", 25, -1)])
}

pub fn orders_layout() -> TableLayout {
    TableLayout::new(
        "orders",
        vec![
            ColumnDef::new("id", ColumnType::Int32),
            ColumnDef::new("qty", ColumnType::Int32),
            ColumnDef::new("label", ColumnType::String).nullable(),
        ],
    )
    .with_id_column("id")
}

pub fn items_layout() -> TableLayout {
    TableLayout::new(
        "items",
        vec![
            ColumnDef::new("id", ColumnType::Int64),
            ColumnDef::new("name", ColumnType::String),
        ],
    )
    .with_id_column("id")
}

/// A transaction as the slot would return it.
#[derive(Debug, Clone)]
pub struct Txn {
    pub end_lsn: u64,
    pub changes: Vec<RawChange>,
}

impl Txn {
    /// Wrap `payloads` in Begin/Commit, numbering change positions below
    /// `end_lsn`.
    pub fn new(end_lsn: u64, payloads: Vec<String>) -> Self {
        let start = end_lsn - 16 * (payloads.len() as u64 + 2);
        let mut changes = vec![RawChange::new(start, begin(end_lsn - 16, 1))];
        for (i, data) in payloads.into_iter().enumerate() {
            changes.push(RawChange::new(start + 16 * (i as u64 + 1), data));
        }
        changes.push(RawChange::new(end_lsn - 16, commit(end_lsn)));
        Self { end_lsn, changes }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    txns: Vec<Txn>,
    confirmed: Lsn,
    advances: Vec<Lsn>,
    pulls: usize,
    fail_next_pull: Option<String>,
}

/// In-memory slot with peek semantics: every pull starts at the confirmed
/// position and returns whole transactions until the change bound is hit.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<SlotState>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, txn: Txn) {
        self.state.lock().unwrap().txns.push(txn);
    }

    pub fn fail_next_pull(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_next_pull = Some(message.into());
    }

    pub fn confirmed(&self) -> Lsn {
        self.state.lock().unwrap().confirmed
    }

    pub fn advances(&self) -> Vec<Lsn> {
        self.state.lock().unwrap().advances.clone()
    }

    pub fn pulls(&self) -> usize {
        self.state.lock().unwrap().pulls
    }
}

impl ChangeSource for ScriptedSource {
    async fn pull(&self, _after: Lsn, max_changes: u32) -> PgResult<Vec<RawChange>> {
        let mut state = self.state.lock().unwrap();
        state.pulls += 1;
        if let Some(message) = state.fail_next_pull.take() {
            return Err(PgError::Postgres(message));
        }

        let confirmed = state.confirmed;
        let mut out = Vec::new();
        for txn in state.txns.iter().filter(|t| Lsn(t.end_lsn) > confirmed) {
            if out.len() >= max_changes as usize {
                break;
            }
            out.extend(txn.changes.iter().cloned());
        }
        Ok(out)
    }

    async fn advance(&self, to: Lsn) -> PgResult<Lsn> {
        let mut state = self.state.lock().unwrap();
        if to < state.confirmed {
            return Err(PgError::Replication(format!(
                "cannot advance replication slot to {}, minimum is {}",
                to, state.confirmed
            )));
        }
        state.confirmed = to;
        state.advances.push(to);
        Ok(to)
    }
}
