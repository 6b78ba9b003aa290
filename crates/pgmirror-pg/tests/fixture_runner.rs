mod common;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use common::{delete, insert, relation, update, Payload};
use pgmirror_core::{ColumnDef, ColumnType, TableLayout};
use pgmirror_pg::{Lsn, MessageDecoder};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    description: String,
    tables: Vec<TableDef>,
    #[serde(default = "default_version")]
    version: u64,
    messages: Vec<MessageDef>,
    expected: Expected,
}

fn default_version() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct TableDef {
    name: String,
    #[serde(default)]
    id_column: Option<String>,
    columns: Vec<ColumnSpec>,
}

#[derive(Debug, Deserialize)]
struct ColumnSpec {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
    #[serde(default)]
    element: Option<String>,
    #[serde(default)]
    nullable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageDef {
    Begin {
        final_lsn: u64,
        xid: u32,
    },
    Commit {
        end_lsn: u64,
    },
    Origin {
        lsn: u64,
        name: String,
    },
    Type {
        id: u32,
        name: String,
    },
    Truncate {
        relations: Vec<u32>,
    },
    Relation {
        id: u32,
        name: String,
        #[serde(default = "default_identity")]
        identity: char,
        columns: Vec<(String, u32, i32)>,
    },
    Insert {
        relation: u32,
        new: Vec<Option<String>>,
    },
    Update {
        relation: u32,
        #[serde(default)]
        key: Option<Vec<Option<String>>>,
        #[serde(default)]
        old: Option<Vec<Option<String>>>,
        new: Vec<Option<String>>,
    },
    Delete {
        relation: u32,
        old: Vec<Option<String>>,
    },
}

fn default_identity() -> char {
    'd'
}

#[derive(Debug, Deserialize)]
struct Expected {
    #[serde(default)]
    final_lsn: Option<u64>,
    #[serde(default)]
    skipped: Vec<u32>,
    #[serde(default)]
    quarantined: Vec<String>,
    tables: HashMap<String, Vec<ExpectedRow>>,
}

#[derive(Debug, Deserialize)]
struct ExpectedRow {
    values: Vec<serde_json::Value>,
    sign: i8,
    #[serde(default)]
    version: Option<u64>,
}

fn build_layout(def: &TableDef) -> TableLayout {
    let columns = def
        .columns
        .iter()
        .map(|c| {
            let column_type = if c.column_type == "array" {
                let element = c.element.as_deref().expect("array column needs an element");
                ColumnType::array_of(element.parse().expect("unknown element type"))
            } else {
                c.column_type.parse().expect("unknown column type")
            };
            let column = ColumnDef::new(&c.name, column_type);
            if c.nullable {
                column.nullable()
            } else {
                column
            }
        })
        .collect();

    let layout = TableLayout::new(&def.name, columns);
    match &def.id_column {
        Some(id) => layout.with_id_column(id),
        None => layout,
    }
}

fn as_refs(values: &[Option<String>]) -> Vec<Option<&str>> {
    values.iter().map(|v| v.as_deref()).collect()
}

fn encode(def: &MessageDef) -> String {
    match def {
        MessageDef::Begin { final_lsn, xid } => common::begin(*final_lsn, *xid),
        MessageDef::Commit { end_lsn } => common::commit(*end_lsn),
        MessageDef::Origin { lsn, name } => Payload::new(b'O').i64(*lsn as i64).string(name).hex(),
        MessageDef::Type { id, name } => Payload::new(b'Y')
            .i32(*id as i32)
            .string("public")
            .string(name)
            .hex(),
        MessageDef::Truncate { relations } => {
            let mut p = Payload::new(b'T').i32(relations.len() as i32).u8(0);
            for id in relations {
                p = p.i32(*id as i32);
            }
            p.hex()
        }
        MessageDef::Relation {
            id,
            name,
            identity,
            columns,
        } => {
            let columns: Vec<(&str, u32, i32)> = columns
                .iter()
                .map(|(n, oid, typmod)| (n.as_str(), *oid, *typmod))
                .collect();
            relation(*id, name, *identity as u8, &columns)
        }
        MessageDef::Insert { relation, new } => insert(*relation, &as_refs(new)),
        MessageDef::Update {
            relation,
            key,
            old,
            new,
        } => {
            let key = key.as_ref().map(|k| as_refs(k));
            let old = old.as_ref().map(|o| as_refs(o));
            let prior = match (&key, &old) {
                (_, Some(o)) => Some((b'O', o.as_slice())),
                (Some(k), None) => Some((b'K', k.as_slice())),
                (None, None) => None,
            };
            update(*relation, prior, &as_refs(new))
        }
        MessageDef::Delete { relation, old } => delete(*relation, &as_refs(old)),
    }
}

fn run_fixture(fixture: &Fixture) -> MessageDecoder {
    let mut decoder = MessageDecoder::new(fixture.tables.iter().map(build_layout));
    for (i, msg) in fixture.messages.iter().enumerate() {
        decoder
            .decode(&encode(msg), fixture.version)
            .unwrap_or_else(|e| panic!("{}: message {} failed: {}", fixture.name, i, e));
    }
    decoder
}

fn check_expectations(fixture: &Fixture, decoder: &MessageDecoder) {
    assert_eq!(
        decoder.final_lsn(),
        fixture.expected.final_lsn.map(Lsn),
        "{}: final lsn",
        fixture.name
    );
    assert_eq!(
        decoder.relations().skipped(),
        fixture.expected.skipped,
        "{}: skip list",
        fixture.name
    );
    let quarantined: Vec<String> = decoder.quarantined_tables().iter().cloned().collect();
    assert_eq!(quarantined, fixture.expected.quarantined, "{}: quarantined", fixture.name);

    for table in &fixture.tables {
        let buffer = decoder.buffer(&table.name).unwrap();
        let expected = fixture
            .expected
            .tables
            .get(&table.name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        assert_eq!(
            buffer.len(),
            expected.len(),
            "{}: row count for {}",
            fixture.name,
            table.name
        );

        let rows = buffer.snapshot();
        for (idx, want) in expected.iter().enumerate() {
            let got: Vec<serde_json::Value> = rows
                .row(idx)
                .into_iter()
                .take(table.columns.len())
                .map(|v| serde_json::Value::from(v.clone()))
                .collect();
            assert_eq!(got, want.values, "{}: {} row {}", fixture.name, table.name, idx);
            assert_eq!(rows.sign(idx), want.sign, "{}: {} row {} sign", fixture.name, table.name, idx);
            assert_eq!(
                rows.version(idx),
                want.version.unwrap_or(fixture.version),
                "{}: {} row {} version",
                fixture.name,
                table.name,
                idx
            );
        }
    }
}

fn load_and_run_fixture(path: &Path) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {:?}: {}", path, e));
    let fixture: Fixture = serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {:?}: {}", path, e));

    println!("Running fixture: {} - {}", fixture.name, fixture.description);
    let decoder = run_fixture(&fixture);
    check_expectations(&fixture, &decoder);
}

fn fixtures_dir() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn test_all_fixtures() {
    let mut count = 0;
    for entry in fs::read_dir(fixtures_dir()).expect("Failed to read fixtures directory") {
        let path = entry.expect("Failed to read entry").path();
        if path.extension().is_some_and(|e| e == "json") {
            load_and_run_fixture(&path);
            count += 1;
        }
    }
    assert!(count > 0, "no fixtures found in {:?}", fixtures_dir());
}

#[test]
fn test_orders_insert_fixture() {
    load_and_run_fixture(&fixtures_dir().join("orders_insert.json"));
}

#[test]
fn test_schema_drift_fixture() {
    load_and_run_fixture(&fixtures_dir().join("schema_drift.json"));
}
