//! Key normalization and first-seen cache population.
//!
//! Normalization is a pure function; the cache write is a separate step so
//! each can be tested on its own. The stage forwards every record with its
//! value untouched, whatever the cache did.

use std::sync::Arc;

use tracing::{debug, warn};

use repartitioner_cache::CacheClient;
use repartitioner_core::StreamRecord;

use crate::metrics::StageMetrics;

/// Canonical form of a record key: uppercased, or absent if the key was.
pub fn normalize_key(key: Option<&str>) -> Option<String> {
    key.map(str::to_uppercase)
}

/// What the cache step did for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Record had no key; the cache was not touched.
    Skipped,
    /// Key was absent from the cache and the value was written.
    Written,
    /// Key was already cached; nothing written.
    AlreadyPresent,
    /// The cache read or write failed. The record is still forwarded.
    Failed(String),
}

/// Re-keys records and writes first-seen values to the cache.
pub struct RekeyStage {
    cache: Arc<dyn CacheClient>,
    metrics: Arc<StageMetrics>,
}

impl RekeyStage {
    pub fn new(cache: Arc<dyn CacheClient>, metrics: Arc<StageMetrics>) -> Self {
        Self { cache, metrics }
    }

    /// Normalize the key, populate the cache, and return the re-keyed record.
    pub fn process(&self, record: StreamRecord) -> (StreamRecord, CacheOutcome) {
        self.metrics.record_processed();

        let key = normalize_key(record.key.as_deref());
        let outcome = match key.as_deref() {
            Some(k) => self.populate_cache(k, &record.value),
            None => {
                self.metrics.record_without_key();
                CacheOutcome::Skipped
            }
        };

        debug!(key = ?key, value = %record.value, ?outcome, "record rekeyed");
        (
            StreamRecord {
                key,
                value: record.value,
            },
            outcome,
        )
    }

    /// Write `value` under `key` only if the cache has nothing for it yet.
    pub fn populate_cache(&self, key: &str, value: &str) -> CacheOutcome {
        match self.cache.get(key) {
            Ok(Some(_)) => {
                self.metrics.cache_hit();
                CacheOutcome::AlreadyPresent
            }
            Ok(None) => match self.cache.set(key, value) {
                Ok(()) => {
                    self.metrics.cache_write();
                    CacheOutcome::Written
                }
                Err(e) => {
                    self.metrics.cache_error();
                    warn!(%key, error = %e, backend = self.cache.backend_name(), "cache write failed");
                    CacheOutcome::Failed(e.to_string())
                }
            },
            Err(e) => {
                self.metrics.cache_error();
                warn!(%key, error = %e, backend = self.cache.backend_name(), "cache read failed");
                CacheOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use repartitioner_cache::{CacheError, CacheResult};

    /// Cache that records every call and can be told to fail.
    #[derive(Default)]
    pub(crate) struct RecordingCache {
        pub data: Mutex<HashMap<String, String>>,
        pub gets: Mutex<Vec<String>>,
        pub sets: Mutex<Vec<(String, String)>>,
        pub fail_gets: bool,
        pub fail_sets: bool,
    }

    impl RecordingCache {
        pub fn with_entry(key: &str, value: &str) -> Self {
            let cache = Self::default();
            cache.data.lock().unwrap().insert(key.to_string(), value.to_string());
            cache
        }

        pub fn set_calls(&self) -> Vec<(String, String)> {
            self.sets.lock().unwrap().clone()
        }

        pub fn get_calls(&self) -> Vec<String> {
            self.gets.lock().unwrap().clone()
        }
    }

    impl CacheClient for RecordingCache {
        fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.gets.lock().unwrap().push(key.to_string());
            if self.fail_gets {
                return Err(CacheError::Server("ERR unavailable".into()));
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> CacheResult<()> {
            self.sets.lock().unwrap().push((key.to_string(), value.to_string()));
            if self.fail_sets {
                return Err(CacheError::Server("ERR read only".into()));
            }
            self.data.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "recording"
        }
    }

    fn stage(cache: Arc<RecordingCache>) -> (RekeyStage, Arc<StageMetrics>) {
        let metrics = Arc::new(StageMetrics::new());
        (RekeyStage::new(cache, metrics.clone()), metrics)
    }

    #[test]
    fn normalize_key_uppercases() {
        assert_eq!(normalize_key(Some("foo")), Some("FOO".to_string()));
        assert_eq!(normalize_key(Some("MiXeD-1")), Some("MIXED-1".to_string()));
        assert_eq!(normalize_key(Some("straße")), Some("STRASSE".to_string()));
        assert_eq!(normalize_key(Some("")), Some(String::new()));
        assert_eq!(normalize_key(None), None);
    }

    #[test]
    fn writes_to_cache_when_key_not_present() {
        let cache = Arc::new(RecordingCache::default());
        let (stage, metrics) = stage(cache.clone());

        let (out, outcome) = stage.process(StreamRecord::new("abc", "123"));

        assert_eq!(out, StreamRecord::new("ABC", "123"));
        assert_eq!(outcome, CacheOutcome::Written);
        assert_eq!(cache.set_calls(), vec![("ABC".to_string(), "123".to_string())]);
        assert_eq!(metrics.snapshot().cache_writes, 1);
    }

    #[test]
    fn does_not_write_when_key_already_present() {
        let cache = Arc::new(RecordingCache::with_entry("XYZ", "old"));
        let (stage, metrics) = stage(cache.clone());

        let (out, outcome) = stage.process(StreamRecord::new("xyz", "new"));

        assert_eq!(out.value, "new");
        assert_eq!(outcome, CacheOutcome::AlreadyPresent);
        assert!(cache.set_calls().is_empty());
        assert_eq!(metrics.snapshot().cache_hits, 1);
    }

    #[test]
    fn first_seen_value_wins() {
        let cache = Arc::new(RecordingCache::default());
        let (stage, _) = stage(cache.clone());

        stage.process(StreamRecord::new("key", "first"));
        stage.process(StreamRecord::new("KEY", "second"));
        stage.process(StreamRecord::new("Key", "third"));

        assert_eq!(cache.set_calls(), vec![("KEY".to_string(), "first".to_string())]);
        assert_eq!(cache.data.lock().unwrap().get("KEY").map(String::as_str), Some("first"));
    }

    #[test]
    fn skips_cache_interaction_when_key_is_absent() {
        let cache = Arc::new(RecordingCache::default());
        let (stage, metrics) = stage(cache.clone());

        let (out, outcome) = stage.process(StreamRecord::keyless("value"));

        assert_eq!(out, StreamRecord::keyless("value"));
        assert_eq!(outcome, CacheOutcome::Skipped);
        assert!(cache.get_calls().is_empty());
        assert!(cache.set_calls().is_empty());
        assert_eq!(metrics.snapshot().records_without_key, 1);
    }

    #[test]
    fn cache_read_failure_still_forwards_record() {
        let cache = Arc::new(RecordingCache {
            fail_gets: true,
            ..Default::default()
        });
        let (stage, metrics) = stage(cache.clone());

        let (out, outcome) = stage.process(StreamRecord::new("abc", "1"));

        assert_eq!(out, StreamRecord::new("ABC", "1"));
        assert!(matches!(outcome, CacheOutcome::Failed(_)));
        assert!(cache.set_calls().is_empty());
        assert_eq!(metrics.snapshot().cache_errors, 1);
    }

    #[test]
    fn cache_write_failure_still_forwards_record() {
        let cache = Arc::new(RecordingCache {
            fail_sets: true,
            ..Default::default()
        });
        let (stage, metrics) = stage(cache);

        let (out, outcome) = stage.process(StreamRecord::new("abc", "1"));

        assert_eq!(out.key.as_deref(), Some("ABC"));
        assert!(matches!(outcome, CacheOutcome::Failed(_)));
        assert_eq!(metrics.snapshot().cache_errors, 1);
        assert_eq!(metrics.snapshot().records_processed, 1);
    }
}
