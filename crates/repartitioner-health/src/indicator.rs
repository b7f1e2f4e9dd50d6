//! Health indicator: poll, track, aggregate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use repartitioner_core::InstanceProvider;

use crate::aggregator::{aggregate, AggregateHealth};
use crate::poller::{PollResult, RuntimePoller};
use crate::tracker::RebalanceTracker;

/// Entry point for health queries. Safe to call from many threads at once.
pub struct HealthIndicator {
    poller: RuntimePoller,
    tracker: RebalanceTracker,
}

impl HealthIndicator {
    pub fn new(
        application: impl Into<String>,
        provider: Arc<dyn InstanceProvider>,
        rebalancing_max: Duration,
    ) -> Self {
        Self {
            poller: RuntimePoller::new(application, provider),
            tracker: RebalanceTracker::new(rebalancing_max),
        }
    }

    pub fn application(&self) -> &str {
        self.poller.application()
    }

    pub fn threshold(&self) -> Duration {
        self.tracker.threshold()
    }

    pub fn health(&self) -> AggregateHealth {
        self.health_at(Instant::now())
    }

    pub fn health_at(&self, now: Instant) -> AggregateHealth {
        let instances = match self.poller.poll() {
            PollResult::NoInstances => {
                self.tracker.retain_only(&[]);
                None
            }
            PollResult::Instances(snapshots) => {
                let ids: Vec<&str> = snapshots.iter().map(|s| s.id.as_str()).collect();
                self.tracker.retain_only(&ids);
                Some(
                    snapshots
                        .iter()
                        .map(|s| self.tracker.observe_at(s, now))
                        .collect(),
                )
            }
        };

        let health = aggregate(self.application(), instances, self.tracker.threshold());
        debug!(status = ?health.status, instances = health.instances.len(), "health evaluated");
        health
    }
}
