//! A backend that disables persistence entirely: every write is dropped and
//! every read reports "absent" (spec §4.F's "no-persistence operation" mode,
//! used when a run opts out of a durable store but still needs a
//! `ResultsDatabase` object to plug into a `MaterializationStore`).

use crate::storage::error::StorageResult;
use crate::storage::results_db::{ResultRecord, ResultsDatabase};
use crate::value::VoxValue;

#[derive(Default)]
pub struct NoCacheResultsDatabase;

impl NoCacheResultsDatabase {
    pub fn new() -> Self {
        Self
    }
}

impl ResultsDatabase for NoCacheResultsDatabase {
    fn has(&self, _node_id: &str) -> bool {
        false
    }

    fn get_record(&self, _node_id: &str) -> StorageResult<Option<ResultRecord>> {
        Ok(None)
    }

    fn put_success(&self, _node_id: &str, _value: &VoxValue, _metadata: serde_json::Value) -> StorageResult<()> {
        Ok(())
    }

    fn put_failure(&self, _node_id: &str, _error: &str, _metadata: serde_json::Value) -> StorageResult<()> {
        Ok(())
    }

    fn delete(&self, _node_id: &str) -> StorageResult<()> {
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
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
    fn writes_never_become_readable() {
        let db = NoCacheResultsDatabase::new();
        db.put_success("n1", &VoxValue::Scalar(ScalarValue::Integer(1)), serde_json::json!({})).unwrap();
        assert!(!db.has("n1"));
        assert!(db.get_record("n1").unwrap().is_none());
    }
}
