use std::collections::HashMap;
use std::future::Future;

use pgmirror_core::{RowSet, TableStore, Value, SIGN_COLUMN};
use tracing::debug;

use crate::error::{TpError, TpResult};

type Document = HashMap<String, serde_json::Value>;

/// Upserts and deletes left after collapsing a row set by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub upserts: Vec<Document>,
    pub deletes: Vec<serde_json::Value>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collapse a row set into one write with replace-by-version semantics.
///
/// For every id only the last row in stream order survives: a `+1` row
/// becomes an upsert carrying its `_version`, a `-1` row becomes a delete.
pub fn collapse(rows: &RowSet) -> TpResult<WriteBatch> {
    let id_column = rows
        .id_column
        .as_deref()
        .ok_or_else(|| TpError::MissingIdColumn(rows.table.clone()))?;
    let ids = rows
        .column(id_column)
        .ok_or_else(|| TpError::Validation(format!("id column '{}' not in row set", id_column)))?;

    let mut last: HashMap<String, usize> = HashMap::new();
    for (idx, id) in ids.iter().enumerate() {
        let key = doc_id(&rows.table, id)?.to_string();
        last.insert(key, idx);
    }

    let mut survivors: Vec<usize> = last.into_values().collect();
    survivors.sort_unstable();

    let mut batch = WriteBatch::default();
    for idx in survivors {
        let id = doc_id(&rows.table, &ids[idx])?;
        if rows.sign(idx) < 0 {
            batch.deletes.push(id);
            continue;
        }

        let mut doc: Document = rows
            .column_names
            .iter()
            .zip(rows.row(idx))
            .filter(|(name, _)| name.as_str() != SIGN_COLUMN)
            .map(|(name, value)| (name.clone(), serde_json::Value::from(value.clone())))
            .collect();
        doc.insert("id".to_string(), id);
        batch.upserts.push(doc);
    }

    Ok(batch)
}

/// turbopuffer ids are unsigned integers or strings.
fn doc_id(table: &str, value: &Value) -> TpResult<serde_json::Value> {
    match value {
        Value::UInt(u) => Ok(serde_json::Value::from(*u)),
        Value::Int(i) if *i >= 0 => Ok(serde_json::Value::from(*i)),
        Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        other => Err(TpError::InvalidId {
            table: table.to_string(),
            value: format!("{:?}", other),
        }),
    }
}

/// Destination store writing each table into a turbopuffer namespace.
pub struct TurbopufferStore {
    client: rs_puff::Client,
    namespaces: HashMap<String, String>,
}

impl TurbopufferStore {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: rs_puff::Client::new(api_key),
            namespaces: HashMap::new(),
        }
    }

    /// Write `table` into `namespace` instead of a namespace of the same name.
    pub fn with_namespace(mut self, table: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.namespaces.insert(table.into(), namespace.into());
        self
    }

    pub fn namespace_for<'a>(&'a self, table: &'a str) -> &'a str {
        self.namespaces.get(table).map(String::as_str).unwrap_or(table)
    }
}

impl TableStore for TurbopufferStore {
    type Error = TpError;

    fn insert(&self, rows: RowSet) -> impl Future<Output = TpResult<usize>> + Send {
        let namespace = self.namespace_for(&rows.table).to_string();
        let batch = collapse(&rows);
        let ns = self.client.namespace(&namespace);
        let received = rows.num_rows();

        async move {
            let batch = batch?;
            if batch.is_empty() {
                return Ok(0);
            }

            let written = batch.len();
            let params = rs_puff::WriteParams {
                upsert_rows: (!batch.upserts.is_empty()).then_some(batch.upserts),
                deletes: (!batch.deletes.is_empty()).then_some(batch.deletes),
                ..Default::default()
            };

            ns.write(params)
                .await
                .map_err(|e| TpError::RsPuff(e.to_string()))?;

            debug!(namespace = %namespace, rows = received, documents = written, "Wrote to turbopuffer");
            Ok(written)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgmirror_core::{ChangeBuffer, ColumnDef, ColumnType, Sign, TableLayout};

    fn rows(changes: &[(i64, &str, Sign)]) -> RowSet {
        let layout = TableLayout::new(
            "orders",
            vec![
                ColumnDef::new("order_id", ColumnType::Int64),
                ColumnDef::new("label", ColumnType::String),
            ],
        )
        .with_id_column("order_id");
        let mut buffer = ChangeBuffer::new(layout);
        for (id, label, sign) in changes {
            buffer
                .push_row(vec![Value::Int(*id), Value::String(label.to_string())], *sign, 4)
                .unwrap();
        }
        buffer.snapshot()
    }

    #[test]
    fn test_collapse_keeps_last_row_per_id() {
        let batch = collapse(&rows(&[
            (1, "a", Sign::Positive),
            (1, "a", Sign::Negative),
            (1, "b", Sign::Positive),
            (2, "x", Sign::Positive),
        ]))
        .unwrap();

        assert!(batch.deletes.is_empty());
        assert_eq!(batch.upserts.len(), 2);
        let first = &batch.upserts[0];
        assert_eq!(first["id"], serde_json::json!(1));
        assert_eq!(first["label"], serde_json::json!("b"));
        assert_eq!(first["_version"], serde_json::json!(4));
        assert!(!first.contains_key("_sign"));
    }

    #[test]
    fn test_collapse_delete_wins_when_last() {
        let batch = collapse(&rows(&[(7, "a", Sign::Positive), (7, "a", Sign::Negative)])).unwrap();
        assert!(batch.upserts.is_empty());
        assert_eq!(batch.deletes, vec![serde_json::json!(7)]);
    }

    #[test]
    fn test_collapse_requires_id_column() {
        let mut set = rows(&[(1, "a", Sign::Positive)]);
        set.id_column = None;
        assert!(matches!(collapse(&set), Err(TpError::MissingIdColumn(_))));
    }

    #[test]
    fn test_negative_id_rejected() {
        let err = collapse(&rows(&[(-1, "a", Sign::Positive)])).unwrap_err();
        assert!(matches!(err, TpError::InvalidId { .. }));
    }

    #[test]
    fn test_namespace_mapping() {
        let store = TurbopufferStore::new("key").with_namespace("orders", "prod_orders");
        assert_eq!(store.namespace_for("orders"), "prod_orders");
        assert_eq!(store.namespace_for("items"), "items");
    }
}
