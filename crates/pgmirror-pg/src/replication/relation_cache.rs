//! Cache for PostgreSQL relation metadata.
//!
//! PostgreSQL sends Relation messages before the first DML on each table in a
//! decoding session, and again whenever the relation changes. The first
//! signature seen for a relation id is kept; later ones are compared against
//! it, never swapped in, and a mismatch quarantines the relation.

use std::collections::{HashMap, HashSet};

use super::pgoutput::{RelationMessage, ReplicaIdentity};

/// Cached information about a PostgreSQL relation (table).
#[derive(Debug, Clone, PartialEq)]
pub struct RelationInfo {
    pub namespace: String,
    pub name: String,
    pub replica_identity: ReplicaIdentity,
    /// Ordered (type oid, type modifier) per column.
    pub signature: Vec<(u32, i32)>,
}

impl From<&RelationMessage> for RelationInfo {
    fn from(msg: &RelationMessage) -> Self {
        Self {
            namespace: msg.namespace.clone(),
            name: msg.name.clone(),
            replica_identity: msg.replica_identity,
            signature: msg.signature(),
        }
    }
}

/// Outcome of registering a Relation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    New,
    Unchanged,
    Drifted,
}

/// Relation id to schema mapping plus the skip list of quarantined ids.
#[derive(Debug, Default)]
pub struct RelationCache {
    relations: HashMap<u32, RelationInfo>,
    skipped: HashSet<u32>,
}

impl RelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache an unseen relation, or compare a known one against its cached
    /// signature. A drifted relation is added to the skip list.
    pub fn register_or_validate(&mut self, msg: &RelationMessage) -> SchemaStatus {
        match self.relations.get(&msg.relation_id) {
            None => {
                self.relations.insert(msg.relation_id, msg.into());
                SchemaStatus::New
            }
            Some(cached) if cached.signature == msg.signature() => SchemaStatus::Unchanged,
            Some(_) => {
                self.skipped.insert(msg.relation_id);
                SchemaStatus::Drifted
            }
        }
    }

    /// Look up relation info by OID.
    pub fn get(&self, relation_id: u32) -> Option<&RelationInfo> {
        self.relations.get(&relation_id)
    }

    /// Add a relation to the skip list.
    pub fn quarantine(&mut self, relation_id: u32) {
        self.skipped.insert(relation_id);
    }

    pub fn is_skipped(&self, relation_id: u32) -> bool {
        self.skipped.contains(&relation_id)
    }

    /// Quarantined relation ids, in ascending order.
    pub fn skipped(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.skipped.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of cached relations.
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::pgoutput::ColumnInfo;

    fn relation(id: u32, types: &[(u32, i32)]) -> RelationMessage {
        RelationMessage {
            relation_id: id,
            namespace: "public".to_string(),
            name: "orders".to_string(),
            replica_identity: ReplicaIdentity::Default,
            columns: types
                .iter()
                .enumerate()
                .map(|(i, (oid, typmod))| ColumnInfo {
                    flags: 0,
                    name: format!("c{}", i),
                    type_oid: *oid,
                    type_modifier: *typmod,
                })
                .collect(),
        }
    }

    #[test]
    fn test_first_sight_is_cached() {
        let mut cache = RelationCache::new();
        let status = cache.register_or_validate(&relation(5, &[(23, -1), (1043, 64)]));

        assert_eq!(status, SchemaStatus::New);
        let info = cache.get(5).unwrap();
        assert_eq!(info.name, "orders");
        assert_eq!(info.signature, vec![(23, -1), (1043, 64)]);
        assert!(!cache.is_skipped(5));
    }

    #[test]
    fn test_identical_signature_leaves_skip_list_alone() {
        let mut cache = RelationCache::new();
        let msg = relation(5, &[(23, -1), (1043, 64)]);
        cache.register_or_validate(&msg);

        // Column names may differ; only types count
        let mut renamed = msg.clone();
        renamed.columns[1].name = "label".into();

        assert_eq!(cache.register_or_validate(&msg), SchemaStatus::Unchanged);
        assert_eq!(cache.register_or_validate(&renamed), SchemaStatus::Unchanged);
        assert!(cache.skipped().is_empty());
    }

    #[test]
    fn test_type_change_drifts() {
        let mut cache = RelationCache::new();
        cache.register_or_validate(&relation(5, &[(23, -1), (23, -1), (1043, 64)]));

        let status = cache.register_or_validate(&relation(5, &[(23, -1), (23, -1), (25, -1)]));
        assert_eq!(status, SchemaStatus::Drifted);
        assert!(cache.is_skipped(5));
        // Cached signature is not replaced
        assert_eq!(cache.get(5).unwrap().signature[2], (1043, 64));
    }

    #[test]
    fn test_typmod_and_count_changes_drift() {
        let mut cache = RelationCache::new();
        cache.register_or_validate(&relation(1, &[(1043, 64)]));
        cache.register_or_validate(&relation(2, &[(23, -1)]));

        assert_eq!(
            cache.register_or_validate(&relation(1, &[(1043, 128)])),
            SchemaStatus::Drifted
        );
        assert_eq!(
            cache.register_or_validate(&relation(2, &[(23, -1), (25, -1)])),
            SchemaStatus::Drifted
        );
        assert_eq!(cache.skipped(), vec![1, 2]);
    }

    #[test]
    fn test_drifted_relation_stays_skipped() {
        let mut cache = RelationCache::new();
        let original = relation(5, &[(23, -1)]);
        cache.register_or_validate(&original);
        cache.register_or_validate(&relation(5, &[(20, -1)]));

        // Reverting the schema does not lift the quarantine
        assert_eq!(cache.register_or_validate(&original), SchemaStatus::Unchanged);
        assert!(cache.is_skipped(5));
    }
}
