//! Error types for the keyed table.

use thiserror::Error;

/// Result type alias for keyed table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur during keyed table operations.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}
