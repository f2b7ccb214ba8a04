//! Storage engine error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("no materialized record for node {0}")]
    NotMaterialized(String),

    #[error("value for persistence could not be encoded: {0}")]
    Unencodable(String),

    #[error("{0}")]
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
