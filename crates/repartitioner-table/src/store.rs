//! KeyedTable: redb-backed materialized table with a changelog.
//!
//! Upserts are last-write-wins per key. Each upsert appends a
//! `ChangelogRecord` in the same write transaction as the entry itself.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing and standalone runs).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::{debug, info};

use crate::error::{TableError, TableResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `TableError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| TableError::$variant(e.to_string())
    };
}

/// Thread-safe keyed table backed by redb.
#[derive(Clone)]
pub struct KeyedTable {
    db: Arc<Database>,
}

impl KeyedTable {
    /// Open (or create) a persistent table at the given path.
    ///
    /// If the entries table is empty but the changelog is not, the entries
    /// are rebuilt from the changelog before returning.
    pub fn open(path: &Path) -> TableResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let table = Self { db: Arc::new(db) };
        table.ensure_tables()?;
        if table.is_empty()? && table.last_seq()? > 0 {
            let replayed = table.restore_from_changelog()?;
            info!(?path, replayed, "keyed table restored from changelog");
        }
        debug!(?path, "keyed table opened");
        Ok(table)
    }

    /// Create an ephemeral in-memory table.
    pub fn open_in_memory() -> TableResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let table = Self { db: Arc::new(db) };
        table.ensure_tables()?;
        debug!("in-memory keyed table opened");
        Ok(table)
    }

    fn ensure_tables(&self) -> TableResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Entries ────────────────────────────────────────────────────

    /// Insert or overwrite the value for `key`. Returns the changelog sequence.
    pub fn upsert(&self, key: &str, value: &str) -> TableResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut changelog = txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
            seq = changelog
                .last()
                .map_err(map_err!(Read))?
                .map(|(k, _)| k.value() + 1)
                .unwrap_or(1);

            let record = ChangelogRecord {
                seq,
                key: key.to_string(),
                value: value.to_string(),
                recorded_at: epoch_millis(),
            };
            let encoded = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            changelog
                .insert(seq, encoded.as_slice())
                .map_err(map_err!(Write))?;

            let mut entries = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            entries.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, seq, "table entry upserted");
        Ok(seq)
    }

    /// Point lookup by normalized key.
    pub fn get(&self, key: &str) -> TableResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        Ok(table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string()))
    }

    /// List up to `limit` entries in key order.
    pub fn list_entries(&self, limit: usize) -> TableResult<Vec<TableEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            results.push(TableEntry {
                key: key.value().to_string(),
                value: value.value().to_string(),
            });
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Number of materialized rows.
    pub fn len(&self) -> TableResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }

    pub fn is_empty(&self) -> TableResult<bool> {
        Ok(self.len()? == 0)
    }

    // ── Changelog ──────────────────────────────────────────────────

    /// Highest sequence number written so far (0 when the changelog is empty).
    pub fn last_seq(&self) -> TableResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
        Ok(table
            .last()
            .map_err(map_err!(Read))?
            .map(|(k, _)| k.value())
            .unwrap_or(0))
    }

    /// Changelog records with a sequence number strictly greater than `seq`.
    pub fn changelog_since(&self, seq: u64) -> TableResult<Vec<ChangelogRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(seq.saturating_add(1)..).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ChangelogRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Rebuild the entries table by replaying the whole changelog.
    ///
    /// Returns the number of records replayed.
    pub fn restore_from_changelog(&self) -> TableResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut replayed = 0;
        {
            let changelog = txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
            let mut entries = txn.open_table(ENTRIES).map_err(map_err!(Table))?;

            let stale: Vec<String> = entries
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
                .collect();
            for key in &stale {
                entries.remove(key.as_str()).map_err(map_err!(Write))?;
            }

            for entry in changelog.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let record: ChangelogRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                entries
                    .insert(record.key.as_str(), record.value.as_str())
                    .map_err(map_err!(Write))?;
                replayed += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(replayed)
    }

    /// Drop every changelog record superseded by a later one for the same key.
    ///
    /// Returns the number of records removed.
    pub fn compact_changelog(&self) -> TableResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut changelog = txn.open_table(CHANGELOG).map_err(map_err!(Table))?;

            let mut latest: HashMap<String, u64> = HashMap::new();
            let mut all = Vec::new();
            for entry in changelog.iter().map_err(map_err!(Read))? {
                let (seq, value) = entry.map_err(map_err!(Read))?;
                let record: ChangelogRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                latest.insert(record.key, seq.value());
                all.push(seq.value());
            }

            let keep: std::collections::HashSet<u64> = latest.into_values().collect();
            let superseded: Vec<u64> = all.into_iter().filter(|s| !keep.contains(s)).collect();
            for seq in &superseded {
                changelog.remove(*seq).map_err(map_err!(Write))?;
            }
            removed = superseded.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(removed, "changelog compacted");
        Ok(removed)
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_get() {
        let table = KeyedTable::open_in_memory().unwrap();
        table.upsert("FOO", "bar").unwrap();
        assert_eq!(table.get("FOO").unwrap().as_deref(), Some("bar"));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let table = KeyedTable::open_in_memory().unwrap();
        assert!(table.get("NOPE").unwrap().is_none());
        assert!(table.is_empty().unwrap());
    }

    #[test]
    fn last_write_wins() {
        let table = KeyedTable::open_in_memory().unwrap();
        table.upsert("K", "first").unwrap();
        table.upsert("K", "second").unwrap();
        table.upsert("OTHER", "x").unwrap();
        table.upsert("K", "third").unwrap();

        assert_eq!(table.get("K").unwrap().as_deref(), Some("third"));
        assert_eq!(table.len().unwrap(), 2);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let table = KeyedTable::open_in_memory().unwrap();
        table.upsert("ABC", "1").unwrap();
        assert!(table.get("abc").unwrap().is_none());
    }

    #[test]
    fn changelog_sequences_are_monotonic() {
        let table = KeyedTable::open_in_memory().unwrap();
        assert_eq!(table.last_seq().unwrap(), 0);
        assert_eq!(table.upsert("A", "1").unwrap(), 1);
        assert_eq!(table.upsert("B", "2").unwrap(), 2);
        assert_eq!(table.upsert("A", "3").unwrap(), 3);

        let all = table.changelog_since(0).unwrap();
        assert_eq!(all.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![1, 2, 3]);

        let tail = table.changelog_since(2).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].entry(), TableEntry { key: "A".into(), value: "3".into() });
    }

    #[test]
    fn list_entries_respects_limit() {
        let table = KeyedTable::open_in_memory().unwrap();
        for k in ["A", "B", "C"] {
            table.upsert(k, "v").unwrap();
        }
        assert_eq!(table.list_entries(10).unwrap().len(), 3);
        let limited = table.list_entries(2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].key, "A");
    }

    #[test]
    fn restore_rebuilds_entries_from_changelog() {
        let table = KeyedTable::open_in_memory().unwrap();
        table.upsert("A", "1").unwrap();
        table.upsert("A", "2").unwrap();
        table.upsert("B", "3").unwrap();

        assert_eq!(table.restore_from_changelog().unwrap(), 3);
        assert_eq!(table.get("A").unwrap().as_deref(), Some("2"));
        assert_eq!(table.get("B").unwrap().as_deref(), Some("3"));
        assert_eq!(table.len().unwrap(), 2);
    }

    #[test]
    fn compaction_keeps_latest_record_per_key() {
        let table = KeyedTable::open_in_memory().unwrap();
        table.upsert("A", "1").unwrap();
        table.upsert("B", "2").unwrap();
        table.upsert("A", "3").unwrap();
        table.upsert("A", "4").unwrap();

        assert_eq!(table.compact_changelog().unwrap(), 2);
        let remaining = table.changelog_since(0).unwrap();
        assert_eq!(remaining.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![2, 4]);

        // Sequences keep increasing after compaction.
        assert_eq!(table.upsert("C", "5").unwrap(), 5);
        assert_eq!(table.restore_from_changelog().unwrap(), 3);
        assert_eq!(table.get("A").unwrap().as_deref(), Some("4"));
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("table.redb");

        {
            let table = KeyedTable::open(&db_path).unwrap();
            table.upsert("FOO", "bar").unwrap();
            table.upsert("FOO", "baz").unwrap();
        }

        let table = KeyedTable::open(&db_path).unwrap();
        assert_eq!(table.get("FOO").unwrap().as_deref(), Some("baz"));
        assert_eq!(table.last_seq().unwrap(), 2);
    }
}
