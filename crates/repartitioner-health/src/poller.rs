//! Runtime state poller.
//!
//! Reads lifecycle state and live thread count from every runtime handle
//! the [`InstanceProvider`] knows about. Handles are in-process, so a poll
//! is a handful of atomic loads.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use repartitioner_core::{InstanceProvider, LifecycleState};

/// One instance as seen by a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub id: String,
    /// `None` when the instance has no runtime handle yet.
    pub lifecycle: Option<LifecycleState>,
    pub thread_count: usize,
}

/// Outcome of enumerating the runtime instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Nothing to monitor. Distinct from every instance being down.
    NoInstances,
    Instances(Vec<InstanceSnapshot>),
}

pub struct RuntimePoller {
    application: String,
    provider: Arc<dyn InstanceProvider>,
}

impl RuntimePoller {
    pub fn new(application: impl Into<String>, provider: Arc<dyn InstanceProvider>) -> Self {
        Self {
            application: application.into(),
            provider,
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn poll(&self) -> PollResult {
        let handles = self.provider.instances();
        if handles.is_empty() {
            debug!(application = %self.application, "no stream runtime instances to poll");
            return PollResult::NoInstances;
        }

        let mut seen = HashSet::with_capacity(handles.len());
        let snapshots = handles
            .into_iter()
            .enumerate()
            .map(|(ordinal, handle)| {
                let mut snapshot = match handle {
                    Some(rt) => InstanceSnapshot {
                        id: rt
                            .instance_id()
                            .unwrap_or_else(|| self.ordinal_id(ordinal)),
                        lifecycle: Some(rt.state()),
                        thread_count: rt.thread_count(),
                    },
                    None => InstanceSnapshot {
                        id: self.ordinal_id(ordinal),
                        lifecycle: None,
                        thread_count: 0,
                    },
                };
                // Ids key health details and rebalance timers; two instances must not share one.
                if !seen.insert(snapshot.id.clone()) {
                    let unique = format!("{}#{ordinal}", snapshot.id);
                    warn!(
                        application = %self.application,
                        instance = %snapshot.id,
                        ordinal,
                        reported_as = %unique,
                        "duplicate runtime instance id"
                    );
                    snapshot.id = unique;
                    seen.insert(snapshot.id.clone());
                }
                snapshot
            })
            .collect();

        PollResult::Instances(snapshots)
    }

    /// Fallback identifier, stable only while enumeration order is.
    fn ordinal_id(&self, ordinal: usize) -> String {
        format!("{}-topology-{ordinal}", self.application)
    }
}
