//! Shared types used across repartitioner crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A key/value record read from the input topic.
///
/// The key may be absent; the value never is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub key: Option<String>,
    pub value: String,
}

impl StreamRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
        }
    }

    /// A record without a key.
    pub fn keyless(value: impl Into<String>) -> Self {
        Self {
            key: None,
            value: value.into(),
        }
    }
}

/// Lifecycle state reported by a stream runtime instance.
///
/// Mirrors the states a streams engine moves through between creation
/// and shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Created,
    Rebalancing,
    Running,
    PendingShutdown,
    NotRunning,
    PendingError,
    Error,
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Rebalancing => "REBALANCING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::PendingShutdown => "PENDING_SHUTDOWN",
            LifecycleState::NotRunning => "NOT_RUNNING",
            LifecycleState::PendingError => "PENDING_ERROR",
            LifecycleState::Error => "ERROR",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
