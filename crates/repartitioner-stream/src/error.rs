//! Stream processing error types.

use repartitioner_core::LifecycleState;
use thiserror::Error;

/// Errors that can occur while feeding or managing a stream runtime.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("no stream runtime is accepting records for topic {0}")]
    NoRuntime(String),

    #[error("runtime {id} is not accepting records (state {state})")]
    NotAccepting { id: String, state: LifecycleState },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("table error: {0}")]
    Table(#[from] repartitioner_table::TableError),
}

pub type StreamResult<T> = Result<T, StreamError>;
