//! Result persistence: the `ResultsDatabase` backend contract (spec §4.F),
//! its sqlite/in-memory/no-cache implementations, and the in-process
//! `MaterializationStore` every execution strategy compiles a plan against.

pub mod error;
pub mod materialization;
pub mod memory;
pub mod nocache;
pub mod results_db;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use materialization::MaterializationStore;
pub use memory::InMemoryResultsDatabase;
pub use nocache::NoCacheResultsDatabase;
pub use results_db::{ResultRecord, ResultsDatabase, FAILED_STATUS, MATERIALIZED_STATUS};
pub use sqlite::SqliteResultsDatabase;
