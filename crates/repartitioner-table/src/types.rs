//! Row types stored in the keyed table.

use serde::{Deserialize, Serialize};

/// One materialized row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub key: String,
    pub value: String,
}

/// One changelog record. Sequence numbers start at 1 and never repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogRecord {
    pub seq: u64,
    pub key: String,
    pub value: String,
    /// Unix timestamp (milliseconds) when the upsert was applied.
    pub recorded_at: u64,
}

impl ChangelogRecord {
    pub fn entry(&self) -> TableEntry {
        TableEntry {
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}
