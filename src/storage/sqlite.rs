//! Durable `ResultsDatabase` backend: one SQLite table, one row per node,
//! namespaced by `runtime_version` so a schema or kernel change in a new
//! build never serves a stale payload (spec §4.F reference schema).

use crate::codec::{decode_runtime_value, encode_for_storage, EncodedRecord};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::results_db::{unix_time_secs, ResultRecord, ResultsDatabase, FAILED_STATUS, MATERIALIZED_STATUS};
use crate::value::{VoxValue, MAX_PAGE_SIZE};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// `~/.voxlogica/results.db`, created on first use; callers in `serve`/`run`
/// contexts that need an explicit location should pass one directly instead.
pub fn default_db_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
    home.join(".voxlogica").join("results.db")
}

pub struct SqliteResultsDatabase {
    connection: Mutex<Connection>,
    runtime_version: String,
}

impl SqliteResultsDatabase {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Other(e.to_string()))?;
        }
        let connection = Connection::open(path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        connection.busy_timeout(std::time::Duration::from_millis(5000))?;
        let db = Self { connection: Mutex::new(connection), runtime_version: env!("CARGO_PKG_VERSION").to_string() };
        db.initialize_schema()?;
        Ok(db)
    }

    pub fn open_default() -> StorageResult<Self> {
        Self::open(default_db_path())
    }

    fn initialize_schema(&self) -> StorageResult<()> {
        let connection = self.connection.lock();
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS results (
                node_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                payload BLOB,
                payload_encoding TEXT NOT NULL,
                error TEXT,
                metadata_json TEXT NOT NULL,
                runtime_version TEXT NOT NULL,
                created_at REAL NOT NULL,
                updated_at REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_results_status ON results(status);
            CREATE INDEX IF NOT EXISTS idx_results_runtime ON results(runtime_version);",
        )?;
        Ok(())
    }

    fn encode_payload(value: &VoxValue) -> StorageResult<Vec<u8>> {
        let record = encode_for_storage(value, MAX_PAGE_SIZE)?;
        bincode::serialize(&record).map_err(|e| StorageError::Unencodable(e.to_string()))
    }

    fn decode_payload(bytes: &[u8]) -> StorageResult<VoxValue> {
        let record: EncodedRecord = bincode::deserialize(bytes).map_err(|e| StorageError::Unencodable(e.to_string()))?;
        Ok(decode_runtime_value(&record)?)
    }
}

impl ResultsDatabase for SqliteResultsDatabase {
    fn has(&self, node_id: &str) -> bool {
        let connection = self.connection.lock();
        connection
            .query_row(
                "SELECT 1 FROM results WHERE node_id = ?1 AND runtime_version = ?2 AND status = ?3 LIMIT 1",
                params![node_id, self.runtime_version, MATERIALIZED_STATUS],
                |_| Ok(()),
            )
            .optional()
            .ok()
            .flatten()
            .is_some()
    }

    fn get_record(&self, node_id: &str) -> StorageResult<Option<ResultRecord>> {
        let connection = self.connection.lock();
        let row = connection
            .query_row(
                "SELECT status, payload, payload_encoding, error, metadata_json, created_at, updated_at, runtime_version
                 FROM results WHERE node_id = ?1 AND runtime_version = ?2",
                params![node_id, self.runtime_version],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;
        let Some((status, payload, encoding, error, metadata_json, created_at, updated_at, runtime_version)) = row else {
            return Ok(None);
        };
        let value = match (status.as_str(), payload, encoding.as_str()) {
            (MATERIALIZED_STATUS, Some(bytes), "bincode/voxpod1") => Some(Self::decode_payload(&bytes)?),
            _ => None,
        };
        let metadata = serde_json::from_str(&metadata_json).unwrap_or_else(|_| serde_json::json!({}));
        Ok(Some(ResultRecord { node_id: node_id.to_string(), status, value, error, metadata, created_at, updated_at, runtime_version }))
    }

    fn put_success(&self, node_id: &str, value: &VoxValue, metadata: serde_json::Value) -> StorageResult<()> {
        let payload = Self::encode_payload(value)?;
        let now = unix_time_secs();
        let connection = self.connection.lock();
        connection.execute(
            "INSERT INTO results (node_id, status, payload, payload_encoding, error, metadata_json, runtime_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?7)
             ON CONFLICT(node_id) DO UPDATE SET
                status = excluded.status, payload = excluded.payload, payload_encoding = excluded.payload_encoding,
                error = NULL, metadata_json = excluded.metadata_json, runtime_version = excluded.runtime_version,
                updated_at = excluded.updated_at",
            params![node_id, MATERIALIZED_STATUS, payload, "bincode/voxpod1", metadata.to_string(), self.runtime_version, now],
        )?;
        Ok(())
    }

    fn put_failure(&self, node_id: &str, error: &str, metadata: serde_json::Value) -> StorageResult<()> {
        let now = unix_time_secs();
        let connection = self.connection.lock();
        connection.execute(
            "INSERT INTO results (node_id, status, payload, payload_encoding, error, metadata_json, runtime_version, created_at, updated_at)
             VALUES (?1, ?2, NULL, 'none', ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(node_id) DO UPDATE SET
                status = excluded.status, payload = NULL, payload_encoding = 'none',
                error = excluded.error, metadata_json = excluded.metadata_json, runtime_version = excluded.runtime_version,
                updated_at = excluded.updated_at",
            params![node_id, FAILED_STATUS, error, metadata.to_string(), self.runtime_version, now],
        )?;
        Ok(())
    }

    fn delete(&self, node_id: &str) -> StorageResult<()> {
        self.connection.lock().execute("DELETE FROM results WHERE node_id = ?1", params![node_id])?;
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.connection.lock().execute("DELETE FROM results", [])?;
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
    fn success_then_failure_overwrites_the_same_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteResultsDatabase::open(dir.path().join("results.db")).unwrap();
        db.put_success("n1", &VoxValue::Scalar(ScalarValue::Integer(3)), serde_json::json!({})).unwrap();
        assert!(db.has("n1"));
        db.put_failure("n1", "boom", serde_json::json!({})).unwrap();
        assert!(!db.has("n1"));
        let record = db.get_record("n1").unwrap().unwrap();
        assert_eq!(record.status, FAILED_STATUS);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn round_trips_a_scalar_payload() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteResultsDatabase::open(dir.path().join("results.db")).unwrap();
        db.put_success("n1", &VoxValue::Scalar(ScalarValue::Number(2.5)), serde_json::json!({"k": "v"})).unwrap();
        let record = db.get_record("n1").unwrap().unwrap();
        match record.value {
            Some(VoxValue::Scalar(ScalarValue::Number(n))) => assert_eq!(n, 2.5),
            other => panic!("unexpected {other:?}"),
        }
    }
}
