//! Ephemeral in-process backend for tests and for the "no durable store
//! configured" default.

use crate::storage::error::StorageResult;
use crate::storage::results_db::{unix_time_secs, ResultRecord, ResultsDatabase, FAILED_STATUS, MATERIALIZED_STATUS};
use crate::value::VoxValue;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryResultsDatabase {
    records: Mutex<HashMap<String, ResultRecord>>,
}

impl InMemoryResultsDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultsDatabase for InMemoryResultsDatabase {
    fn has(&self, node_id: &str) -> bool {
        self.records.lock().get(node_id).is_some_and(|r| r.status == MATERIALIZED_STATUS)
    }

    fn get_record(&self, node_id: &str) -> StorageResult<Option<ResultRecord>> {
        Ok(self.records.lock().get(node_id).cloned())
    }

    fn put_success(&self, node_id: &str, value: &VoxValue, metadata: serde_json::Value) -> StorageResult<()> {
        let mut records = self.records.lock();
        let created_at = records.get(node_id).map_or_else(unix_time_secs, |r| r.created_at);
        let now = unix_time_secs();
        records.insert(
            node_id.to_string(),
            ResultRecord {
                node_id: node_id.to_string(),
                status: MATERIALIZED_STATUS.to_string(),
                value: Some(value.clone()),
                error: None,
                metadata,
                created_at,
                updated_at: now,
                runtime_version: "in-memory".to_string(),
            },
        );
        Ok(())
    }

    fn put_failure(&self, node_id: &str, error: &str, metadata: serde_json::Value) -> StorageResult<()> {
        let mut records = self.records.lock();
        let created_at = records.get(node_id).map_or_else(unix_time_secs, |r| r.created_at);
        let now = unix_time_secs();
        records.insert(
            node_id.to_string(),
            ResultRecord {
                node_id: node_id.to_string(),
                status: FAILED_STATUS.to_string(),
                value: None,
                error: Some(error.to_string()),
                metadata,
                created_at,
                updated_at: now,
                runtime_version: "in-memory".to_string(),
            },
        );
        Ok(())
    }

    fn delete(&self, node_id: &str) -> StorageResult<()> {
        self.records.lock().remove(node_id);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.records.lock().clear();
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarValue;

    #[test]
    fn round_trips_a_success_record() {
        let db = InMemoryResultsDatabase::new();
        db.put_success("n1", &VoxValue::Scalar(ScalarValue::Integer(7)), serde_json::json!({})).unwrap();
        assert!(db.has("n1"));
        let record = db.get_record("n1").unwrap().unwrap();
        assert_eq!(record.status, MATERIALIZED_STATUS);
    }

    #[test]
    fn failure_record_is_not_has() {
        let db = InMemoryResultsDatabase::new();
        db.put_failure("n1", "boom", serde_json::json!({})).unwrap();
        assert!(!db.has("n1"));
    }
}
