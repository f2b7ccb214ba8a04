//! Runtime artifact store with optional read/write-through to a durable
//! `ResultsDatabase` (spec §4.F). Every execution strategy compiles a plan
//! into exactly one `MaterializationStore`; node evaluation consults it
//! before doing any work and writes through it as each node is produced.

use crate::ir::NodeId;
use crate::storage::error::StorageResult;
use crate::storage::results_db::{ResultsDatabase, FAILED_STATUS, MATERIALIZED_STATUS};
use crate::value::VoxValue;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone)]
struct MaterializationRecord {
    status: &'static str,
    value: Option<VoxValue>,
    metadata: serde_json::Value,
}

pub struct MaterializationStore {
    records: Mutex<HashMap<NodeId, MaterializationRecord>>,
    backend: Option<Arc<dyn ResultsDatabase>>,
    read_through: bool,
    write_through: bool,
}

impl MaterializationStore {
    pub fn new(backend: Option<Arc<dyn ResultsDatabase>>, read_through: bool, write_through: bool) -> Self {
        Self { records: Mutex::new(HashMap::new()), backend, read_through, write_through }
    }

    /// No durable backend at all: every node recomputes every run.
    pub fn in_memory_only() -> Self {
        Self::new(None, false, false)
    }

    fn materialize_from_backend(&self, node_id: &NodeId) -> Option<MaterializationRecord> {
        if !self.read_through {
            return None;
        }
        let backend = self.backend.as_ref()?;
        let record = backend.get_record(node_id.as_str()).ok().flatten()?;
        let materialized = if record.status == MATERIALIZED_STATUS {
            MaterializationRecord { status: MATERIALIZED_STATUS, value: record.value, metadata: record.metadata }
        } else {
            MaterializationRecord { status: FAILED_STATUS, value: None, metadata: record.metadata }
        };
        self.records.lock().insert(node_id.clone(), materialized.clone());
        Some(materialized)
    }

    pub fn has(&self, node_id: &NodeId) -> bool {
        if let Some(record) = self.records.lock().get(node_id) {
            if record.status == MATERIALIZED_STATUS {
                return true;
            }
        }
        self.materialize_from_backend(node_id).is_some_and(|r| r.status == MATERIALIZED_STATUS)
    }

    pub fn get(&self, node_id: &NodeId) -> StorageResult<VoxValue> {
        let existing = self.records.lock().get(node_id).cloned();
        let record = match existing {
            Some(record) => record,
            None => match self.materialize_from_backend(node_id) {
                Some(record) => record,
                None => {
                    return Err(crate::storage::error::StorageError::NotMaterialized(node_id.to_string()));
                }
            },
        };
        record.value.ok_or_else(|| crate::storage::error::StorageError::NotMaterialized(node_id.to_string()))
    }

    pub fn put(&self, node_id: &NodeId, value: VoxValue, metadata: serde_json::Value) {
        self.records.lock().insert(
            node_id.clone(),
            MaterializationRecord { status: MATERIALIZED_STATUS, value: Some(value.clone()), metadata: metadata.clone() },
        );
        if self.write_through {
            if let Some(backend) = &self.backend {
                let _ = backend.put_success(node_id.as_str(), &value, metadata);
            }
        }
    }

    pub fn fail(&self, node_id: &NodeId, message: &str) {
        self.records.lock().insert(
            node_id.clone(),
            MaterializationRecord { status: FAILED_STATUS, value: None, metadata: serde_json::json!({ "error": message }) },
        );
        if self.write_through {
            if let Some(backend) = &self.backend {
                let _ = backend.put_failure(node_id.as_str(), message, serde_json::json!({ "error": message }));
            }
        }
    }

    pub fn completed_nodes(&self) -> HashSet<NodeId> {
        self.records
            .lock()
            .iter()
            .filter(|(_, r)| r.status == MATERIALIZED_STATUS)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstantValue, NodeSpec};
    use crate::storage::memory::InMemoryResultsDatabase;
    use crate::value::ScalarValue;

    fn node_id() -> NodeId {
        NodeSpec::Constant(ConstantValue::Integer(1)).node_id()
    }

    #[test]
    fn put_then_get_round_trips_without_a_backend() {
        let store = MaterializationStore::in_memory_only();
        let id = node_id();
        store.put(&id, VoxValue::Scalar(ScalarValue::Integer(5)), serde_json::json!({}));
        assert!(store.has(&id));
        match store.get(&id).unwrap() {
            VoxValue::Scalar(ScalarValue::Integer(5)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn read_through_recovers_from_backend_after_cache_miss() {
        let backend = Arc::new(InMemoryResultsDatabase::new());
        let id = node_id();
        backend.put_success(id.as_str(), &VoxValue::Scalar(ScalarValue::Integer(9)), serde_json::json!({})).unwrap();
        let store = MaterializationStore::new(Some(backend), true, false);
        assert!(store.has(&id));
    }

    #[test]
    fn fail_records_without_a_value() {
        let store = MaterializationStore::in_memory_only();
        let id = node_id();
        store.fail(&id, "boom");
        assert!(!store.has(&id));
        assert!(store.get(&id).is_err());
    }
}
