//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("storage lock poisoned")]
    LockPoisoned,

    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    #[error("backend failure: {0}")]
    Backend(String),
}
