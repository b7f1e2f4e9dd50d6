//! repartitioner-health: liveness of the stream runtimes in this process.
//!
//! # Architecture
//!
//! ```text
//! HealthIndicator::health()
//!   ├── RuntimePoller     enumerate runtimes → PollResult
//!   ├── RebalanceTracker  per-instance rebalance timers → InstanceHealth
//!   └── aggregate()       UP / DOWN / UNKNOWN + per-instance details
//! ```
//!
//! An instance that stays in `REBALANCING` longer than the configured
//! threshold is reported as `REBALANCING_TIMEOUT` and takes the aggregate
//! `DOWN`. Evaluation never fails: every fault is classified into a state.

pub mod aggregator;
pub mod indicator;
pub mod poller;
pub mod tracker;

pub use aggregator::{aggregate, AggregateHealth, HealthStatus};
pub use indicator::HealthIndicator;
pub use poller::{InstanceSnapshot, PollResult, RuntimePoller};
pub use tracker::{InstanceHealth, InstanceState, RebalanceTracker};
