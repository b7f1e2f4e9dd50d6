//! Stage counters and Prometheus text exposition.
//!
//! Counters are plain atomics bumped from worker threads; a snapshot is
//! taken on demand for the `/metrics` endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-process counters for the rekey/cache/materialize topology.
#[derive(Debug, Default)]
pub struct StageMetrics {
    records_processed: AtomicU64,
    records_without_key: AtomicU64,
    cache_writes: AtomicU64,
    cache_hits: AtomicU64,
    cache_errors: AtomicU64,
    table_upserts: AtomicU64,
    table_errors: AtomicU64,
}

/// Point-in-time copy of [`StageMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageSnapshot {
    pub records_processed: u64,
    pub records_without_key: u64,
    pub cache_writes: u64,
    pub cache_hits: u64,
    pub cache_errors: u64,
    pub table_upserts: u64,
    pub table_errors: u64,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_without_key(&self) {
        self.records_without_key.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_write(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn table_upsert(&self) {
        self.table_upserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn table_error(&self) {
        self.table_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_without_key: self.records_without_key.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            table_upserts: self.table_upserts.load(Ordering::Relaxed),
            table_errors: self.table_errors.load(Ordering::Relaxed),
        }
    }
}

impl StageSnapshot {
    /// Render the counters in Prometheus text format.
    pub fn render_prometheus(&self, application: &str) -> String {
        let counters: [(&str, &str, u64); 7] = [
            ("repartitioner_records_processed_total", "Records consumed from the input topic.", self.records_processed),
            ("repartitioner_records_without_key_total", "Records forwarded with no key.", self.records_without_key),
            ("repartitioner_cache_writes_total", "First-seen values written to the cache.", self.cache_writes),
            ("repartitioner_cache_hits_total", "Cache writes skipped because the key was present.", self.cache_hits),
            ("repartitioner_cache_errors_total", "Cache reads or writes that failed.", self.cache_errors),
            ("repartitioner_table_upserts_total", "Rows upserted into the keyed table.", self.table_upserts),
            ("repartitioner_table_errors_total", "Keyed table upserts that failed.", self.table_errors),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!("# HELP {name} {help}\n"));
            out.push_str(&format!("# TYPE {name} counter\n"));
            out.push_str(&format!("{name}{{application=\"{application}\"}} {value}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = StageMetrics::new();
        m.record_processed();
        m.record_processed();
        m.cache_write();
        m.cache_hit();
        m.cache_error();
        m.table_upsert();

        let snap = m.snapshot();
        assert_eq!(snap.records_processed, 2);
        assert_eq!(snap.cache_writes, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_errors, 1);
        assert_eq!(snap.table_upserts, 1);
        assert_eq!(snap.table_errors, 0);
    }

    #[test]
    fn render_prometheus_format() {
        let snap = StageSnapshot {
            records_processed: 5,
            cache_writes: 3,
            ..Default::default()
        };
        let output = snap.render_prometheus("repartitioner");

        assert!(output.contains("# TYPE repartitioner_records_processed_total counter"));
        assert!(output.contains("repartitioner_records_processed_total{application=\"repartitioner\"} 5"));
        assert!(output.contains("repartitioner_cache_writes_total{application=\"repartitioner\"} 3"));
        assert!(output.contains("repartitioner_table_errors_total{application=\"repartitioner\"} 0"));
    }
}
