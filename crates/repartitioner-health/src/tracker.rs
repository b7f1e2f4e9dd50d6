//! Rebalance timeout tracker.
//!
//! Keeps one start timestamp per instance while it is rebalancing. The
//! timestamp is set with an atomic insert-if-absent, so concurrent health
//! queries observing the same rebalance agree on when it began. Any
//! observation of a non-rebalancing state clears it.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tracing::{info, warn};

use repartitioner_core::{format_iso8601, LifecycleState};

use crate::poller::InstanceSnapshot;

/// State reported for one instance after timeout evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    NotInitialized,
    Running,
    Rebalancing,
    RebalancingTimeout,
    Error,
    /// Any other engine state. Counted as down.
    Other(String),
}

impl InstanceState {
    pub fn name(&self) -> &str {
        match self {
            InstanceState::NotInitialized => "NOT_INITIALIZED",
            InstanceState::Running => "RUNNING",
            InstanceState::Rebalancing => "REBALANCING",
            InstanceState::RebalancingTimeout => "REBALANCING_TIMEOUT",
            InstanceState::Error => "ERROR",
            InstanceState::Other(name) => name,
        }
    }

    /// Only `RUNNING` and a rebalance still inside the threshold are up.
    pub fn is_up(&self) -> bool {
        matches!(self, InstanceState::Running | InstanceState::Rebalancing)
    }

    fn from_lifecycle(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Running => InstanceState::Running,
            LifecycleState::Rebalancing => InstanceState::Rebalancing,
            LifecycleState::Error => InstanceState::Error,
            other => InstanceState::Other(other.name().to_string()),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for InstanceState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Health of one instance at one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHealth {
    pub instance_id: String,
    pub state: InstanceState,
    pub thread_count: usize,
    /// Set only while the instance is rebalancing.
    pub rebalancing_since: Option<Instant>,
    pub elapsed: Option<Duration>,
}

impl InstanceHealth {
    /// JSON detail record: state and thread count, plus elapsed time and
    /// threshold while rebalancing.
    pub fn detail(&self, threshold: Duration) -> Value {
        let mut detail = json!({
            "state": self.state.name(),
            "threadCount": self.thread_count,
        });
        if let (Some(elapsed), Some(map)) = (self.elapsed, detail.as_object_mut()) {
            map.insert("rebalancingFor".into(), Value::String(format_iso8601(elapsed)));
            map.insert("threshold".into(), Value::String(format_iso8601(threshold)));
        }
        detail
    }
}

pub struct RebalanceTracker {
    since: DashMap<String, Instant>,
    threshold: Duration,
}

impl RebalanceTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            since: DashMap::new(),
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn observe(&self, snapshot: &InstanceSnapshot) -> InstanceHealth {
        self.observe_at(snapshot, Instant::now())
    }

    /// Evaluate one snapshot as of `now`.
    pub fn observe_at(&self, snapshot: &InstanceSnapshot, now: Instant) -> InstanceHealth {
        let Some(lifecycle) = snapshot.lifecycle else {
            self.clear(&snapshot.id);
            return InstanceHealth {
                instance_id: snapshot.id.clone(),
                state: InstanceState::NotInitialized,
                thread_count: 0,
                rebalancing_since: None,
                elapsed: None,
            };
        };

        if lifecycle != LifecycleState::Rebalancing {
            self.clear(&snapshot.id);
            return InstanceHealth {
                instance_id: snapshot.id.clone(),
                state: InstanceState::from_lifecycle(lifecycle),
                thread_count: snapshot.thread_count,
                rebalancing_since: None,
                elapsed: None,
            };
        }

        let since = {
            let entry = self.since.entry(snapshot.id.clone()).or_insert_with(|| {
                info!(instance = %snapshot.id, "rebalance started");
                now
            });
            *entry
        };
        let elapsed = now.saturating_duration_since(since);

        let state = if elapsed > self.threshold {
            warn!(
                instance = %snapshot.id,
                elapsed = %format_iso8601(elapsed),
                threshold = %format_iso8601(self.threshold),
                "rebalancing exceeded threshold"
            );
            InstanceState::RebalancingTimeout
        } else {
            InstanceState::Rebalancing
        };

        InstanceHealth {
            instance_id: snapshot.id.clone(),
            state,
            thread_count: snapshot.thread_count,
            rebalancing_since: Some(since),
            elapsed: Some(elapsed),
        }
    }

    /// Drop timers for instances no longer enumerated.
    pub fn retain_only(&self, ids: &[&str]) {
        self.since.retain(|id, _| ids.contains(&id.as_str()));
    }

    pub fn rebalancing_since(&self, id: &str) -> Option<Instant> {
        self.since.get(id).map(|entry| *entry)
    }

    fn clear(&self, id: &str) {
        if self.since.remove(id).is_some() {
            info!(instance = %id, "rebalance timer cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const THREE_MINUTES: Duration = Duration::from_secs(180);

    fn snap(id: &str, lifecycle: Option<LifecycleState>) -> InstanceSnapshot {
        InstanceSnapshot {
            id: id.to_string(),
            lifecycle,
            thread_count: 2,
        }
    }

    #[test]
    fn rebalance_under_threshold_is_rebalancing() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        let t = Instant::now();
        let s = snap("a", Some(LifecycleState::Rebalancing));

        let h = tracker.observe_at(&s, t);
        assert_eq!(h.state, InstanceState::Rebalancing);
        assert_eq!(h.rebalancing_since, Some(t));
        assert_eq!(h.elapsed, Some(Duration::ZERO));

        let h = tracker.observe_at(&s, t + Duration::from_secs(1));
        assert_eq!(h.state, InstanceState::Rebalancing);
        assert_eq!(h.elapsed, Some(Duration::from_secs(1)));
        assert!(h.state.is_up());
    }

    #[test]
    fn rebalance_past_threshold_times_out() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        let t = Instant::now();
        let s = snap("a", Some(LifecycleState::Rebalancing));

        tracker.observe_at(&s, t);
        let h = tracker.observe_at(&s, t + Duration::from_secs(240));
        assert_eq!(h.state, InstanceState::RebalancingTimeout);
        assert!(!h.state.is_up());
    }

    #[test]
    fn exactly_at_threshold_is_not_a_timeout() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        let t = Instant::now();
        let s = snap("a", Some(LifecycleState::Rebalancing));

        tracker.observe_at(&s, t);
        let h = tracker.observe_at(&s, t + THREE_MINUTES);
        assert_eq!(h.state, InstanceState::Rebalancing);
    }

    #[test]
    fn leaving_rebalancing_clears_timer() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        let t = Instant::now();

        tracker.observe_at(&snap("a", Some(LifecycleState::Rebalancing)), t);
        let h = tracker.observe_at(&snap("a", Some(LifecycleState::Running)), t + Duration::from_secs(10));
        assert_eq!(h.state, InstanceState::Running);
        assert_eq!(h.rebalancing_since, None);
        assert_eq!(tracker.rebalancing_since("a"), None);

        // A new rebalance starts a fresh window.
        let later = t + Duration::from_secs(600);
        let h = tracker.observe_at(&snap("a", Some(LifecycleState::Rebalancing)), later);
        assert_eq!(h.rebalancing_since, Some(later));
        assert_eq!(h.state, InstanceState::Rebalancing);
    }

    #[test]
    fn missing_handle_is_not_initialized_and_clears_timer() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        let t = Instant::now();
        tracker.observe_at(&snap("a", Some(LifecycleState::Rebalancing)), t);

        let h = tracker.observe_at(&snap("a", None), t);
        assert_eq!(h.state, InstanceState::NotInitialized);
        assert_eq!(h.thread_count, 0);
        assert_eq!(tracker.rebalancing_since("a"), None);
    }

    #[test]
    fn unrecognized_states_are_down() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        for lifecycle in [
            LifecycleState::Created,
            LifecycleState::PendingShutdown,
            LifecycleState::NotRunning,
            LifecycleState::PendingError,
        ] {
            let h = tracker.observe(&snap("a", Some(lifecycle)));
            assert_eq!(h.state, InstanceState::Other(lifecycle.name().to_string()));
            assert!(!h.state.is_up());
        }
        assert!(!tracker.observe(&snap("a", Some(LifecycleState::Error))).state.is_up());
    }

    #[test]
    fn retain_only_drops_vanished_instances() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        let t = Instant::now();
        tracker.observe_at(&snap("a", Some(LifecycleState::Rebalancing)), t);
        tracker.observe_at(&snap("b", Some(LifecycleState::Rebalancing)), t);

        tracker.retain_only(&["b"]);
        assert_eq!(tracker.rebalancing_since("a"), None);
        assert_eq!(tracker.rebalancing_since("b"), Some(t));
    }

    #[test]
    fn concurrent_observers_agree_on_start() {
        let tracker = Arc::new(RebalanceTracker::new(THREE_MINUTES));
        let base = Instant::now();

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    tracker
                        .observe_at(
                            &snap("a", Some(LifecycleState::Rebalancing)),
                            base + Duration::from_millis(i),
                        )
                        .rebalancing_since
                })
            })
            .collect();

        let starts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = tracker.rebalancing_since("a");
        assert!(first.is_some());
        assert!(starts.iter().all(|s| *s == first));
    }

    #[test]
    fn detail_includes_rebalance_timing() {
        let tracker = RebalanceTracker::new(THREE_MINUTES);
        let t = Instant::now();
        let s = snap("a", Some(LifecycleState::Rebalancing));
        tracker.observe_at(&s, t);
        let h = tracker.observe_at(&s, t + Duration::from_secs(1));

        let detail = h.detail(THREE_MINUTES);
        assert_eq!(detail["state"], "REBALANCING");
        assert_eq!(detail["threadCount"], 2);
        assert_eq!(detail["rebalancingFor"], "PT1S");
        assert_eq!(detail["threshold"], "PT3M");

        let running = tracker.observe_at(&snap("a", Some(LifecycleState::Running)), t);
        let detail = running.detail(THREE_MINUTES);
        assert!(detail.get("rebalancingFor").is_none());
        assert!(detail.get("threshold").is_none());
    }
}
