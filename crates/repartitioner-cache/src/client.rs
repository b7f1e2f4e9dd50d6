//! The cache client seam and the in-process implementation.

use dashmap::DashMap;

use crate::error::CacheResult;

/// Key/value cache with plain get/set semantics.
///
/// Implementations are called from stream worker threads and may block.
pub trait CacheClient: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Check the backend is reachable.
    fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    /// Short name for logs.
    fn backend_name(&self) -> &'static str;
}

/// In-process cache backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheClient for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
