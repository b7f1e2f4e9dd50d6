//! The single-stage topology: rekey and cache, then materialize.

use std::sync::Arc;

use tracing::error;

use repartitioner_cache::CacheClient;
use repartitioner_core::StreamRecord;
use repartitioner_table::KeyedTable;

use crate::materialize::Materializer;
use crate::metrics::StageMetrics;
use crate::rekey::{CacheOutcome, RekeyStage};

/// Wiring of [`RekeyStage`] into [`Materializer`] for one input topic.
pub struct Topology {
    input_topic: String,
    stage: RekeyStage,
    materializer: Materializer,
    metrics: Arc<StageMetrics>,
}

impl Topology {
    pub fn new(
        input_topic: impl Into<String>,
        cache: Arc<dyn CacheClient>,
        table: KeyedTable,
        metrics: Arc<StageMetrics>,
    ) -> Self {
        Self {
            input_topic: input_topic.into(),
            stage: RekeyStage::new(cache, metrics.clone()),
            materializer: Materializer::new(table, metrics.clone()),
            metrics,
        }
    }

    pub fn input_topic(&self) -> &str {
        &self.input_topic
    }

    pub fn table(&self) -> &KeyedTable {
        self.materializer.table()
    }

    pub fn metrics(&self) -> &Arc<StageMetrics> {
        &self.metrics
    }

    /// Run one record through the topology.
    ///
    /// Neither a cache fault nor a table fault propagates: both are logged
    /// and counted, and processing continues with the next record.
    pub fn process(&self, record: StreamRecord) -> CacheOutcome {
        let (rekeyed, outcome) = self.stage.process(record);
        if let Err(e) = self.materializer.materialize(&rekeyed) {
            error!(key = ?rekeyed.key, error = %e, "failed to materialize record");
        }
        outcome
    }
}
