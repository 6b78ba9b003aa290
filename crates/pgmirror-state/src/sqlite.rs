use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{StateError, StateResult};
use crate::{Checkpoint, MetadataStore};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    slot_name TEXT PRIMARY KEY,
    lsn INTEGER NOT NULL,
    version INTEGER NOT NULL,
    updated_at TEXT
)";

/// SQLite-backed metadata store.
#[derive(Debug)]
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open or create a metadata store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening metadata store");

        let conn = Connection::open(path)?;
        conn.execute(SCHEMA, [])?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn row_to_checkpoint(lsn: i64, version: i64, updated_at: Option<String>) -> StateResult<Checkpoint> {
    let updated_at = updated_at
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StateError::InvalidValue(format!("updated_at '{}': {}", s, e)))
        })
        .transpose()?;

    Ok(Checkpoint {
        lsn: lsn as u64,
        version: version as u64,
        updated_at,
    })
}

impl MetadataStore for SqliteMetadataStore {
    fn load(&self, slot_name: &str) -> StateResult<Option<Checkpoint>> {
        let conn = self.conn.lock().map_err(|_| StateError::Poisoned)?;

        let row = conn
            .query_row(
                "SELECT lsn, version, updated_at FROM checkpoints WHERE slot_name = ?1",
                [slot_name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(lsn, version, updated_at)| row_to_checkpoint(lsn, version, updated_at))
            .transpose()
    }

    fn save(&self, slot_name: &str, checkpoint: &Checkpoint) -> StateResult<()> {
        let conn = self.conn.lock().map_err(|_| StateError::Poisoned)?;
        let updated_at = checkpoint.updated_at.unwrap_or_else(Utc::now).to_rfc3339();

        conn.execute(
            "INSERT INTO checkpoints (slot_name, lsn, version, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(slot_name) DO UPDATE SET
                lsn = ?2,
                version = ?3,
                updated_at = ?4",
            rusqlite::params![
                slot_name,
                checkpoint.lsn as i64,
                checkpoint.version as i64,
                updated_at
            ],
        )?;

        Ok(())
    }

    fn clear(&self, slot_name: &str) -> StateResult<()> {
        let conn = self.conn.lock().map_err(|_| StateError::Poisoned)?;
        conn.execute("DELETE FROM checkpoints WHERE slot_name = ?1", [slot_name])?;
        Ok(())
    }

    fn all(&self) -> StateResult<Vec<(String, Checkpoint)>> {
        let conn = self.conn.lock().map_err(|_| StateError::Poisoned)?;

        let mut stmt = conn.prepare(
            "SELECT slot_name, lsn, version, updated_at FROM checkpoints ORDER BY slot_name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (slot, lsn, version, updated_at) = row?;
            result.push((slot, row_to_checkpoint(lsn, version, updated_at)?));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_roundtrip() {
        let store = SqliteMetadataStore::in_memory().unwrap();

        assert!(store.load("slot_a").unwrap().is_none());

        let checkpoint = Checkpoint {
            lsn: 0x16B3748,
            version: 7,
            updated_at: Some(Utc::now()),
        };
        store.save("slot_a", &checkpoint).unwrap();

        let loaded = store.load("slot_a").unwrap().unwrap();
        assert_eq!(loaded.lsn, 0x16B3748);
        assert_eq!(loaded.version, 7);
        assert!(loaded.updated_at.is_some());
    }

    #[test]
    fn test_checkpoint_update_and_clear() {
        let store = SqliteMetadataStore::in_memory().unwrap();

        store
            .save("slot", &Checkpoint { lsn: 100, version: 1, updated_at: None })
            .unwrap();
        store
            .save("slot", &Checkpoint { lsn: 200, version: 2, updated_at: None })
            .unwrap();

        let loaded = store.load("slot").unwrap().unwrap();
        assert_eq!(loaded.lsn, 200);
        assert_eq!(loaded.version, 2);

        store.clear("slot").unwrap();
        assert!(store.load("slot").unwrap().is_none());
    }

    #[test]
    fn test_all_checkpoints_sorted() {
        let store = SqliteMetadataStore::in_memory().unwrap();

        store
            .save("b_slot", &Checkpoint { lsn: 2, version: 1, updated_at: None })
            .unwrap();
        store
            .save("a_slot", &Checkpoint { lsn: 1, version: 1, updated_at: None })
            .unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "a_slot");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = SqliteMetadataStore::open(&path).unwrap();
            store
                .save("slot", &Checkpoint { lsn: 42, version: 5, updated_at: None })
                .unwrap();
        }

        let store = SqliteMetadataStore::open(&path).unwrap();
        assert_eq!(store.load("slot").unwrap().unwrap().version, 5);
    }
}
