//! Upserts re-keyed records into the keyed table.

use std::sync::Arc;

use tracing::debug;

use repartitioner_core::StreamRecord;
use repartitioner_table::KeyedTable;

use crate::error::StreamResult;
use crate::metrics::StageMetrics;

pub struct Materializer {
    table: KeyedTable,
    metrics: Arc<StageMetrics>,
}

impl Materializer {
    pub fn new(table: KeyedTable, metrics: Arc<StageMetrics>) -> Self {
        Self { table, metrics }
    }

    pub fn table(&self) -> &KeyedTable {
        &self.table
    }

    /// Upsert a re-keyed record. Keyless records are not materialized.
    ///
    /// Returns the changelog sequence of the write, if one happened.
    pub fn materialize(&self, record: &StreamRecord) -> StreamResult<Option<u64>> {
        let Some(key) = record.key.as_deref() else {
            debug!("keyless record not materialized");
            return Ok(None);
        };
        match self.table.upsert(key, &record.value) {
            Ok(seq) => {
                self.metrics.table_upsert();
                Ok(Some(seq))
            }
            Err(e) => {
                self.metrics.table_error();
                Err(e.into())
            }
        }
    }
}
