//! Protocol state machine turning pgoutput messages into buffered rows.

use std::collections::{BTreeMap, BTreeSet};

use pgmirror_core::{ChangeBuffer, Sign, TableLayout, Value};
use tracing::{debug, warn};

use super::lsn::Lsn;
use super::pgoutput::{ColumnValue, PgOutputMessage, RelationMessage, TupleData};
use super::relation_cache::{RelationCache, SchemaStatus};
use crate::error::{PgError, PgResult};

/// Buffer lengths and transaction state captured before a batch, used to
/// undo a batch that failed halfway.
#[derive(Debug, Clone)]
pub struct DecoderMark {
    lengths: Vec<(String, usize)>,
    final_lsn: Option<Lsn>,
    pending: BTreeSet<String>,
}

/// Decodes one payload at a time into per-table change buffers.
///
/// Owns the relation cache, the skip list and the buffers for a single
/// replication session.
#[derive(Debug)]
pub struct MessageDecoder {
    buffers: BTreeMap<String, ChangeBuffer>,
    relations: RelationCache,
    current_table: Option<String>,
    final_lsn: Option<Lsn>,
    pending: BTreeSet<String>,
    quarantined: BTreeSet<String>,
    unchanged_values: u64,
}

impl MessageDecoder {
    pub fn new(layouts: impl IntoIterator<Item = TableLayout>) -> Self {
        let buffers = layouts
            .into_iter()
            .map(|layout| (layout.name.clone(), ChangeBuffer::new(layout)))
            .collect();

        Self {
            buffers,
            relations: RelationCache::new(),
            current_table: None,
            final_lsn: None,
            pending: BTreeSet::new(),
            quarantined: BTreeSet::new(),
            unchanged_values: 0,
        }
    }

    /// Parse and apply one hex-encoded payload, stamping rows with `version`.
    ///
    /// Returns the number of rows appended.
    pub fn decode(&mut self, payload: &str, version: u64) -> PgResult<usize> {
        let msg = PgOutputMessage::parse(payload)?;
        self.apply(msg, version)
    }

    /// Apply an already parsed message.
    pub fn apply(&mut self, msg: PgOutputMessage, version: u64) -> PgResult<usize> {
        match msg {
            PgOutputMessage::Begin(begin) => {
                debug!(xid = begin.xid, final_lsn = %Lsn(begin.final_lsn), "Begin");
                Ok(0)
            }
            PgOutputMessage::Commit(commit) => {
                let end = Lsn(commit.end_lsn);
                debug!(end_lsn = %end, "Commit");
                self.final_lsn = Some(end);
                Ok(0)
            }
            PgOutputMessage::Origin(_) | PgOutputMessage::Type(_) => Ok(0),
            PgOutputMessage::Truncate(truncate) => {
                debug!(relations = ?truncate.relation_ids, "Ignoring truncate");
                Ok(0)
            }
            PgOutputMessage::Relation(relation) => {
                self.on_relation(&relation);
                Ok(0)
            }
            PgOutputMessage::Insert(insert) => {
                let Some(table) = self.resolve(insert.relation_id)? else {
                    return Ok(0);
                };
                let row = self.build_row(&table, &insert.tuple)?;
                self.append(&table, vec![(row, Sign::Positive)], version)
            }
            PgOutputMessage::Update(update) => {
                let Some(table) = self.resolve(update.relation_id)? else {
                    return Ok(0);
                };
                if update.key_tuple.is_some() {
                    debug!(table = %table, "Discarding key tuple of update");
                }
                let mut rows = Vec::with_capacity(2);
                if let Some(old) = &update.old_tuple {
                    rows.push((self.build_row(&table, old)?, Sign::Negative));
                }
                rows.push((self.build_row(&table, &update.new_tuple)?, Sign::Positive));
                self.append(&table, rows, version)
            }
            PgOutputMessage::Delete(delete) => {
                let Some(table) = self.resolve(delete.relation_id)? else {
                    return Ok(0);
                };
                let row = self.build_row(&table, &delete.old_tuple)?;
                self.append(&table, vec![(row, Sign::Negative)], version)
            }
        }
    }

    fn on_relation(&mut self, relation: &RelationMessage) {
        let status = self.relations.register_or_validate(relation);

        // A relation keeps the name it was first cached under, renamed or not
        let table = self
            .relations
            .get(relation.relation_id)
            .map_or_else(|| relation.name.clone(), |info| info.name.clone());
        self.current_table = Some(table.clone());

        match status {
            SchemaStatus::New => {
                debug!(
                    relation_id = relation.relation_id,
                    table = %relation.name,
                    columns = relation.columns.len(),
                    "Cached relation schema"
                );
            }
            SchemaStatus::Unchanged => {}
            SchemaStatus::Drifted => self.quarantine(relation.relation_id, &table),
        }
    }

    /// Skip `relation_id` from now on and drop the table's unflushed rows.
    pub fn quarantine(&mut self, relation_id: u32, table: &str) {
        self.relations.quarantine(relation_id);

        let dropped = match self.buffers.get_mut(table) {
            Some(buffer) => {
                let n = buffer.len();
                buffer.clear();
                n
            }
            None => 0,
        };
        self.pending.remove(table);

        if self.quarantined.insert(table.to_string()) {
            warn!(
                relation_id,
                table = %table,
                dropped_rows = dropped,
                "Schema drift detected, table quarantined until resync"
            );
        }
    }

    /// Destination table for a row-level message, or `None` when the
    /// relation is quarantined.
    fn resolve(&self, relation_id: u32) -> PgResult<Option<String>> {
        if self.relations.is_skipped(relation_id) {
            debug!(relation_id, "Skipping change for quarantined relation");
            return Ok(None);
        }

        let name = match self.relations.get(relation_id) {
            Some(info) => info.name.clone(),
            None => self
                .current_table
                .clone()
                .ok_or_else(|| PgError::UnknownTable(format!("relation {}", relation_id)))?,
        };

        if !self.buffers.contains_key(&name) {
            return Err(PgError::UnknownTable(name));
        }
        Ok(Some(name))
    }

    fn build_row(&mut self, table: &str, tuple: &TupleData) -> PgResult<Vec<Value>> {
        let layout = self
            .buffers
            .get(table)
            .map(ChangeBuffer::layout)
            .ok_or_else(|| PgError::UnknownTable(table.to_string()))?;

        if tuple.columns.len() > layout.width() {
            return Err(PgError::ColumnCountMismatch {
                table: table.to_string(),
                expected: layout.width(),
                actual: tuple.columns.len(),
            });
        }

        let mut unchanged = 0;
        let mut row = Vec::with_capacity(layout.width());
        for (idx, column) in layout.columns.iter().enumerate() {
            let value = match tuple.columns.get(idx) {
                Some(ColumnValue::Text(text)) => column.convert(text)?,
                Some(ColumnValue::Null) | None => column.null_value(),
                Some(ColumnValue::Unchanged) => {
                    unchanged += 1;
                    warn!(
                        table = %table,
                        column = %column.name,
                        "Unchanged TOAST value not transmitted, writing default"
                    );
                    column.null_value()
                }
            };
            row.push(value);
        }

        self.unchanged_values += unchanged;
        Ok(row)
    }

    fn append(&mut self, table: &str, rows: Vec<(Vec<Value>, Sign)>, version: u64) -> PgResult<usize> {
        let buffer = self
            .buffers
            .get_mut(table)
            .ok_or_else(|| PgError::UnknownTable(table.to_string()))?;

        let n = rows.len();
        for (values, sign) in rows {
            buffer.push_row(values, sign, version)?;
        }
        self.pending.insert(table.to_string());
        Ok(n)
    }

    /// Capture the state a failed batch rolls back to.
    pub fn mark(&self) -> DecoderMark {
        DecoderMark {
            lengths: self
                .buffers
                .iter()
                .map(|(name, buffer)| (name.clone(), buffer.len()))
                .collect(),
            final_lsn: self.final_lsn,
            pending: self.pending.clone(),
        }
    }

    /// Drop everything appended since `mark`.
    ///
    /// Schema cache entries and quarantines are kept: drift seen in the
    /// failed batch is still drift.
    pub fn rollback(&mut self, mark: DecoderMark) {
        for (name, len) in mark.lengths {
            if let Some(buffer) = self.buffers.get_mut(&name) {
                buffer.truncate(len);
            }
        }
        self.final_lsn = mark.final_lsn;
        self.pending = mark
            .pending
            .into_iter()
            .filter(|name| self.buffers.get(name).is_some_and(|b| !b.is_empty()))
            .collect();
    }

    /// Candidate checkpoint: end position of the last decoded commit.
    pub fn final_lsn(&self) -> Option<Lsn> {
        self.final_lsn
    }

    pub fn buffer(&self, table: &str) -> Option<&ChangeBuffer> {
        self.buffers.get(table)
    }

    pub(crate) fn buffer_mut(&mut self, table: &str) -> Option<&mut ChangeBuffer> {
        self.buffers.get_mut(table)
    }

    pub fn buffers(&self) -> impl Iterator<Item = &ChangeBuffer> {
        self.buffers.values()
    }

    /// Tables with rows appended since the last sync pass.
    pub fn pending_tables(&self) -> &BTreeSet<String> {
        &self.pending
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Destination tables quarantined by schema drift.
    pub fn quarantined_tables(&self) -> &BTreeSet<String> {
        &self.quarantined
    }

    pub fn relations(&self) -> &RelationCache {
        &self.relations
    }

    /// Columns received as unchanged TOAST placeholders so far.
    pub fn unchanged_values(&self) -> u64 {
        self.unchanged_values
    }
}
