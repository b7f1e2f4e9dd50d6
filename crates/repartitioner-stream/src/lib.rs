//! repartitioner-stream: the re-key / cache / materialize topology.
//!
//! # Architecture
//!
//! ```text
//! input topic
//!   → StreamRuntime (N worker threads, records routed by normalized key)
//!     → Topology::process()
//!       ├── RekeyStage      normalize key, first-seen cache write (side effect)
//!       └── Materializer    last-write-wins upsert into KeyedTable
//! ```
//!
//! The cache write never filters or fails a record: cache faults are logged
//! and counted in [`StageMetrics`]. Records without a key are forwarded with
//! the key unset and are never materialized.

pub mod error;
pub mod materialize;
pub mod metrics;
pub mod rekey;
pub mod runtime;
pub mod topology;

pub use error::{StreamError, StreamResult};
pub use materialize::Materializer;
pub use metrics::{StageMetrics, StageSnapshot};
pub use rekey::{normalize_key, CacheOutcome, RekeyStage};
pub use runtime::{RuntimeRegistry, StreamRuntime};
pub use topology::Topology;
