//! Cache client error types.

use thiserror::Error;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connect to {address} failed: {message}")]
    Connect { address: String, message: String },

    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache protocol error: {0}")]
    Protocol(String),

    #[error("cache server error: {0}")]
    Server(String),

    #[error("cache connection lock poisoned")]
    Poisoned,
}

impl CacheError {
    /// Whether the underlying connection should be discarded.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, CacheError::Io(_) | CacheError::Protocol(_))
    }
}
