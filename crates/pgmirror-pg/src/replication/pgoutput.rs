//! Parser for the pgoutput logical replication protocol (version 1).
//!
//! Payloads arrive hex-encoded from `pg_logical_slot_peek_binary_changes`.
//!
//! Reference: https://www.postgresql.org/docs/current/protocol-logicalrep-message-formats.html

use super::hex_reader::HexReader;
use crate::error::{PgError, PgResult};

/// A decoded pgoutput message.
#[derive(Debug, Clone, PartialEq)]
pub enum PgOutputMessage {
    Begin(BeginMessage),
    Commit(CommitMessage),
    Origin(OriginMessage),
    Relation(RelationMessage),
    Type(TypeMessage),
    Insert(InsertMessage),
    Update(UpdateMessage),
    Delete(DeleteMessage),
    Truncate(TruncateMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeginMessage {
    pub final_lsn: u64,
    pub timestamp: i64, // microseconds since 2000-01-01
    pub xid: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitMessage {
    pub flags: u8,
    pub commit_lsn: u64,
    pub end_lsn: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OriginMessage {
    pub origin_lsn: u64,
    pub origin_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationMessage {
    pub relation_id: u32,
    pub namespace: String,
    pub name: String,
    pub replica_identity: ReplicaIdentity,
    pub columns: Vec<ColumnInfo>,
}

impl RelationMessage {
    /// Ordered (type oid, type modifier) pairs used for drift detection.
    pub fn signature(&self) -> Vec<(u32, i32)> {
        self.columns
            .iter()
            .map(|c| (c.type_oid, c.type_modifier))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaIdentity {
    Default, // 'd' - default (primary key or unique index)
    Nothing, // 'n' - nothing
    Full,    // 'f' - full (all columns)
    Index,   // 'i' - index
}

impl From<u8> for ReplicaIdentity {
    fn from(b: u8) -> Self {
        match b {
            b'n' => ReplicaIdentity::Nothing,
            b'f' => ReplicaIdentity::Full,
            b'i' => ReplicaIdentity::Index,
            _ => ReplicaIdentity::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub flags: u8, // 1 = part of key
    pub name: String,
    pub type_oid: u32,
    pub type_modifier: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeMessage {
    pub type_id: u32,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertMessage {
    pub relation_id: u32,
    pub tuple: TupleData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMessage {
    pub relation_id: u32,
    /// Key columns of the old row ('K'); not replicated.
    pub key_tuple: Option<TupleData>,
    /// Full old row ('O'), sent under `REPLICA IDENTITY FULL`.
    pub old_tuple: Option<TupleData>,
    pub new_tuple: TupleData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMessage {
    pub relation_id: u32,
    pub old_tuple: TupleData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TruncateMessage {
    pub options: u8,
    pub relation_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TupleData {
    pub columns: Vec<ColumnValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Unchanged, // TOASTed value unchanged
    Text(String),
}

impl PgOutputMessage {
    /// Parse one hex-encoded pgoutput message.
    ///
    /// The whole payload must be consumed; trailing data means the stream and
    /// the parser disagree about the message layout.
    pub fn parse(payload: &str) -> PgResult<Self> {
        let mut reader = HexReader::new(payload);
        let tag = reader.read_u8()?;

        let msg = match tag {
            b'B' => parse_begin(&mut reader)?,
            b'C' => parse_commit(&mut reader)?,
            b'O' => parse_origin(&mut reader)?,
            b'R' => parse_relation(&mut reader)?,
            b'Y' => parse_type(&mut reader)?,
            b'I' => parse_insert(&mut reader)?,
            b'U' => parse_update(&mut reader)?,
            b'D' => parse_delete(&mut reader)?,
            b'T' => parse_truncate(&mut reader)?,
            other => return Err(PgError::UnknownMessageTag(other)),
        };

        if !reader.is_exhausted() {
            return Err(PgError::MalformedPayload(format!(
                "{} trailing hex chars after '{}' message",
                reader.remaining(),
                tag as char
            )));
        }

        Ok(msg)
    }

    /// Relation id referenced by a row-level message.
    pub fn relation_id(&self) -> Option<u32> {
        match self {
            PgOutputMessage::Relation(r) => Some(r.relation_id),
            PgOutputMessage::Insert(i) => Some(i.relation_id),
            PgOutputMessage::Update(u) => Some(u.relation_id),
            PgOutputMessage::Delete(d) => Some(d.relation_id),
            _ => None,
        }
    }
}

fn parse_begin(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let final_lsn = reader.read_i64()? as u64;
    let timestamp = reader.read_i64()?;
    let xid = reader.read_i32()? as u32;

    Ok(PgOutputMessage::Begin(BeginMessage {
        final_lsn,
        timestamp,
        xid,
    }))
}

fn parse_commit(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let flags = reader.read_u8()?;
    let commit_lsn = reader.read_i64()? as u64;
    let end_lsn = reader.read_i64()? as u64;
    let timestamp = reader.read_i64()?;

    Ok(PgOutputMessage::Commit(CommitMessage {
        flags,
        commit_lsn,
        end_lsn,
        timestamp,
    }))
}

fn parse_origin(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let origin_lsn = reader.read_i64()? as u64;
    let origin_name = reader.read_string()?;

    Ok(PgOutputMessage::Origin(OriginMessage {
        origin_lsn,
        origin_name,
    }))
}

fn parse_relation(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let relation_id = reader.read_i32()? as u32;
    let namespace = reader.read_string()?;
    let name = reader.read_string()?;
    let replica_identity = reader.read_u8()?.into();
    let num_columns = read_count(reader)?;

    let mut columns = Vec::with_capacity(num_columns);
    for _ in 0..num_columns {
        let flags = reader.read_u8()?;
        let col_name = reader.read_string()?;
        let type_oid = reader.read_i32()? as u32;
        let type_modifier = reader.read_i32()?;

        columns.push(ColumnInfo {
            flags,
            name: col_name,
            type_oid,
            type_modifier,
        });
    }

    Ok(PgOutputMessage::Relation(RelationMessage {
        relation_id,
        namespace,
        name,
        replica_identity,
        columns,
    }))
}

fn parse_type(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let type_id = reader.read_i32()? as u32;
    let namespace = reader.read_string()?;
    let name = reader.read_string()?;

    Ok(PgOutputMessage::Type(TypeMessage {
        type_id,
        namespace,
        name,
    }))
}

fn parse_insert(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let relation_id = reader.read_i32()? as u32;
    expect_marker(reader, b'N', "insert")?;
    let tuple = parse_tuple(reader)?;

    Ok(PgOutputMessage::Insert(InsertMessage { relation_id, tuple }))
}

fn parse_update(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let relation_id = reader.read_i32()? as u32;

    let mut key_tuple = None;
    let mut old_tuple = None;
    match reader.read_u8()? {
        b'K' => {
            key_tuple = Some(parse_tuple(reader)?);
            expect_marker(reader, b'N', "update")?;
        }
        b'O' => {
            old_tuple = Some(parse_tuple(reader)?);
            expect_marker(reader, b'N', "update")?;
        }
        b'N' => {}
        other => {
            return Err(PgError::MalformedPayload(format!(
                "unexpected tuple type in update: '{}'",
                other as char
            )));
        }
    }
    let new_tuple = parse_tuple(reader)?;

    Ok(PgOutputMessage::Update(UpdateMessage {
        relation_id,
        key_tuple,
        old_tuple,
        new_tuple,
    }))
}

fn parse_delete(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let relation_id = reader.read_i32()? as u32;
    let tuple_type = reader.read_u8()?;

    if tuple_type != b'K' && tuple_type != b'O' {
        return Err(PgError::MalformedPayload(format!(
            "expected 'K' or 'O' for delete tuple, got '{}'",
            tuple_type as char
        )));
    }

    let old_tuple = parse_tuple(reader)?;

    Ok(PgOutputMessage::Delete(DeleteMessage {
        relation_id,
        old_tuple,
    }))
}

fn parse_truncate(reader: &mut HexReader<'_>) -> PgResult<PgOutputMessage> {
    let num_relations = reader.read_i32()?;
    if num_relations < 0 {
        return Err(PgError::MalformedPayload(format!(
            "negative relation count in truncate: {}",
            num_relations
        )));
    }
    let options = reader.read_u8()?;

    let mut relation_ids = Vec::with_capacity(num_relations as usize);
    for _ in 0..num_relations {
        relation_ids.push(reader.read_i32()? as u32);
    }

    Ok(PgOutputMessage::Truncate(TruncateMessage {
        options,
        relation_ids,
    }))
}

fn parse_tuple(reader: &mut HexReader<'_>) -> PgResult<TupleData> {
    let num_columns = read_count(reader)?;
    let mut columns = Vec::with_capacity(num_columns);

    for _ in 0..num_columns {
        let value = match reader.read_u8()? {
            b'n' => ColumnValue::Null,
            b'u' => ColumnValue::Unchanged,
            b't' => {
                let len = reader.read_i32()?;
                if len < 0 {
                    return Err(PgError::MalformedPayload(format!(
                        "negative text length {} at offset {}",
                        len,
                        reader.position()
                    )));
                }
                ColumnValue::Text(reader.read_text(len as usize)?)
            }
            other => {
                return Err(PgError::MalformedPayload(format!(
                    "unknown column value type: '{}' (0x{:02X})",
                    other as char, other
                )));
            }
        };
        columns.push(value);
    }

    Ok(TupleData { columns })
}

fn read_count(reader: &mut HexReader<'_>) -> PgResult<usize> {
    let n = reader.read_i16()?;
    if n < 0 {
        return Err(PgError::MalformedPayload(format!(
            "negative column count {}",
            n
        )));
    }
    Ok(n as usize)
}

fn expect_marker(reader: &mut HexReader<'_>, expected: u8, context: &str) -> PgResult<()> {
    let marker = reader.read_u8()?;
    if marker != expected {
        return Err(PgError::MalformedPayload(format!(
            "expected '{}' tuple in {}, got '{}'",
            expected as char, context, marker as char
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> PgResult<PgOutputMessage> {
        PgOutputMessage::parse(&format!("\\x{}", hex::encode(data)))
    }

    fn text(data: &mut Vec<u8>, value: &str) {
        data.push(b't');
        data.extend_from_slice(&(value.len() as i32).to_be_bytes());
        data.extend_from_slice(value.as_bytes());
    }

    #[test]
    fn test_parse_begin() {
        // 'B' + Int64(final_lsn) + Int64(timestamp) + Int32(xid)
        let mut data = vec![b'B'];
        data.extend_from_slice(&0x16B3748u64.to_be_bytes()); // final_lsn
        data.extend_from_slice(&12345678i64.to_be_bytes()); // timestamp
        data.extend_from_slice(&123u32.to_be_bytes()); // xid

        match parse(&data).unwrap() {
            PgOutputMessage::Begin(b) => {
                assert_eq!(b.xid, 123);
                assert_eq!(b.final_lsn, 0x16B3748);
                assert_eq!(b.timestamp, 12345678);
            }
            other => panic!("expected Begin message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_commit() {
        let mut data = vec![b'C'];
        data.push(0); // flags
        data.extend_from_slice(&100u64.to_be_bytes()); // commit_lsn
        data.extend_from_slice(&200u64.to_be_bytes()); // end_lsn
        data.extend_from_slice(&12345i64.to_be_bytes()); // timestamp

        match parse(&data).unwrap() {
            PgOutputMessage::Commit(c) => {
                assert_eq!(c.flags, 0);
                assert_eq!(c.commit_lsn, 100);
                assert_eq!(c.end_lsn, 200);
            }
            other => panic!("expected Commit message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_relation() {
        let mut data = vec![b'R'];
        data.extend_from_slice(&16384u32.to_be_bytes()); // relation_id
        data.extend_from_slice(b"public\0"); // namespace
        data.extend_from_slice(b"users\0"); // name
        data.push(b'f'); // replica identity (full)
        data.extend_from_slice(&2i16.to_be_bytes()); // num columns

        // Column 1: id
        data.push(1); // flags (part of key)
        data.extend_from_slice(b"id\0");
        data.extend_from_slice(&23u32.to_be_bytes()); // int4
        data.extend_from_slice(&(-1i32).to_be_bytes());

        // Column 2: name
        data.push(0);
        data.extend_from_slice(b"name\0");
        data.extend_from_slice(&1043u32.to_be_bytes()); // varchar
        data.extend_from_slice(&64i32.to_be_bytes());

        match parse(&data).unwrap() {
            PgOutputMessage::Relation(r) => {
                assert_eq!(r.relation_id, 16384);
                assert_eq!(r.namespace, "public");
                assert_eq!(r.name, "users");
                assert_eq!(r.replica_identity, ReplicaIdentity::Full);
                assert_eq!(r.columns.len(), 2);
                assert_eq!(r.columns[0].name, "id");
                assert_eq!(r.signature(), vec![(23, -1), (1043, 64)]);
            }
            other => panic!("expected Relation message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_insert() {
        let mut data = vec![b'I'];
        data.extend_from_slice(&16384u32.to_be_bytes()); // relation_id
        data.push(b'N'); // new tuple marker
        data.extend_from_slice(&3i16.to_be_bytes()); // 3 columns
        text(&mut data, "1");
        data.push(b'n'); // null value
        text(&mut data, "hello");

        match parse(&data).unwrap() {
            PgOutputMessage::Insert(i) => {
                assert_eq!(i.relation_id, 16384);
                assert_eq!(
                    i.tuple.columns,
                    vec![
                        ColumnValue::Text("1".into()),
                        ColumnValue::Null,
                        ColumnValue::Text("hello".into()),
                    ]
                );
            }
            other => panic!("expected Insert message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_with_old_row() {
        let mut data = vec![b'U'];
        data.extend_from_slice(&7u32.to_be_bytes());
        data.push(b'O');
        data.extend_from_slice(&1i16.to_be_bytes());
        text(&mut data, "old");
        data.push(b'N');
        data.extend_from_slice(&1i16.to_be_bytes());
        text(&mut data, "new");

        match parse(&data).unwrap() {
            PgOutputMessage::Update(u) => {
                assert!(u.key_tuple.is_none());
                assert_eq!(
                    u.old_tuple.unwrap().columns,
                    vec![ColumnValue::Text("old".into())]
                );
                assert_eq!(u.new_tuple.columns, vec![ColumnValue::Text("new".into())]);
            }
            other => panic!("expected Update message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_with_key_and_unchanged() {
        let mut data = vec![b'U'];
        data.extend_from_slice(&7u32.to_be_bytes());
        data.push(b'K');
        data.extend_from_slice(&1i16.to_be_bytes());
        text(&mut data, "1");
        data.push(b'N');
        data.extend_from_slice(&2i16.to_be_bytes());
        text(&mut data, "2");
        data.push(b'u');

        match parse(&data).unwrap() {
            PgOutputMessage::Update(u) => {
                assert!(u.key_tuple.is_some());
                assert!(u.old_tuple.is_none());
                assert_eq!(u.new_tuple.columns[1], ColumnValue::Unchanged);
            }
            other => panic!("expected Update message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_delete() {
        let mut data = vec![b'D'];
        data.extend_from_slice(&16384u32.to_be_bytes()); // relation_id
        data.push(b'K'); // key tuple
        data.extend_from_slice(&1i16.to_be_bytes()); // 1 column
        text(&mut data, "1");

        match parse(&data).unwrap() {
            PgOutputMessage::Delete(d) => {
                assert_eq!(d.relation_id, 16384);
                assert_eq!(d.old_tuple.columns.len(), 1);
            }
            other => panic!("expected Delete message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_truncate_and_type() {
        let mut data = vec![b'T'];
        data.extend_from_slice(&2i32.to_be_bytes());
        data.push(0);
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(&6u32.to_be_bytes());
        match parse(&data).unwrap() {
            PgOutputMessage::Truncate(t) => assert_eq!(t.relation_ids, vec![5, 6]),
            other => panic!("expected Truncate message, got {:?}", other),
        }

        let mut data = vec![b'Y'];
        data.extend_from_slice(&16400u32.to_be_bytes());
        data.extend_from_slice(b"public\0mood\0");
        assert!(matches!(parse(&data).unwrap(), PgOutputMessage::Type(_)));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = parse(b"M\x00").unwrap_err();
        assert!(matches!(err, PgError::UnknownMessageTag(b'M')));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_message_underruns() {
        let mut data = vec![b'B'];
        data.extend_from_slice(&1u64.to_be_bytes());
        assert!(matches!(parse(&data), Err(PgError::BufferUnderrun { .. })));
    }

    #[test]
    fn test_trailing_data_is_rejected() {
        let mut data = vec![b'Y'];
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"a\0b\0");
        data.push(0xFF);
        assert!(matches!(parse(&data), Err(PgError::MalformedPayload(_))));
    }
}
