//! `ResultsDatabase`: the stable backend contract for durable and/or
//! ephemeral result storage (spec §4.F), independent of whichever concrete
//! backend (sqlite, in-memory, no-cache) a strategy is configured with.

use crate::storage::error::StorageResult;
use crate::value::VoxValue;

pub const MATERIALIZED_STATUS: &str = "materialized";
pub const FAILED_STATUS: &str = "failed";

#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub node_id: String,
    pub status: String,
    pub value: Option<VoxValue>,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: f64,
    pub updated_at: f64,
    pub runtime_version: String,
}

/// Backend contract every durable/ephemeral result store implements.
/// Namespaced by `runtime_version` (spec §4.F): writes always upsert the
/// current version, reads only ever match it, so records from a previous
/// build of this crate are silently treated as absent rather than trusted.
pub trait ResultsDatabase: Send + Sync {
    fn has(&self, node_id: &str) -> bool;
    fn get_record(&self, node_id: &str) -> StorageResult<Option<ResultRecord>>;
    fn put_success(&self, node_id: &str, value: &VoxValue, metadata: serde_json::Value) -> StorageResult<()>;
    fn put_failure(&self, node_id: &str, error: &str, metadata: serde_json::Value) -> StorageResult<()>;
    fn delete(&self, node_id: &str) -> StorageResult<()>;
    fn clear(&self) -> StorageResult<()>;
    fn close(&self) -> StorageResult<()>;
}

pub(crate) fn unix_time_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
