//! Health aggregation.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::tracker::InstanceHealth;

pub const NO_INSTANCES_REASON: &str = "No stream runtime instances found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    Unknown,
}

/// Overall verdict plus one detail record per instance.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub details: Map<String, Value>,
    #[serde(skip)]
    pub instances: Vec<InstanceHealth>,
}

/// Combine per-instance health into one verdict.
///
/// `None` means the poller found nothing to monitor, which is `UNKNOWN`
/// rather than `DOWN`.
pub fn aggregate(
    application: &str,
    instances: Option<Vec<InstanceHealth>>,
    threshold: Duration,
) -> AggregateHealth {
    let mut details = Map::new();

    let Some(instances) = instances else {
        details.insert("reason".into(), Value::String(NO_INSTANCES_REASON.into()));
        return AggregateHealth {
            status: HealthStatus::Unknown,
            details,
            instances: Vec::new(),
        };
    };

    details.insert("application".into(), Value::String(application.into()));
    for instance in &instances {
        details.insert(instance.instance_id.clone(), instance.detail(threshold));
    }

    let status = if instances.iter().all(|i| i.state.is_up()) {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    };

    AggregateHealth {
        status,
        details,
        instances,
    }
}

impl AggregateHealth {
    pub fn is_down(&self) -> bool {
        self.status == HealthStatus::Down
    }

    /// Health gauges in Prometheus text format.
    pub fn render_prometheus(&self, application: &str) -> String {
        let mut out = String::new();
        let up = match self.status {
            HealthStatus::Up => 1,
            HealthStatus::Down => 0,
            HealthStatus::Unknown => -1,
        };
        out.push_str("# HELP repartitioner_health_status Overall health: 1 up, 0 down, -1 unknown.\n");
        out.push_str("# TYPE repartitioner_health_status gauge\n");
        let _ = writeln!(out, "repartitioner_health_status{{application=\"{application}\"}} {up}");

        if self.instances.is_empty() {
            return out;
        }

        out.push_str("# HELP repartitioner_instance_up Whether the instance counts as up.\n");
        out.push_str("# TYPE repartitioner_instance_up gauge\n");
        for i in &self.instances {
            let _ = writeln!(
                out,
                "repartitioner_instance_up{{application=\"{application}\",instance=\"{}\",state=\"{}\"}} {}",
                i.instance_id,
                i.state,
                u8::from(i.state.is_up())
            );
        }

        out.push_str("# HELP repartitioner_instance_threads Live worker threads per instance.\n");
        out.push_str("# TYPE repartitioner_instance_threads gauge\n");
        for i in &self.instances {
            let _ = writeln!(
                out,
                "repartitioner_instance_threads{{application=\"{application}\",instance=\"{}\"}} {}",
                i.instance_id, i.thread_count
            );
        }

        out.push_str("# HELP repartitioner_instance_rebalancing_seconds Time spent in the current rebalance.\n");
        out.push_str("# TYPE repartitioner_instance_rebalancing_seconds gauge\n");
        for i in &self.instances {
            let secs = i.elapsed.map(|d| d.as_secs_f64()).unwrap_or(0.0);
            let _ = writeln!(
                out,
                "repartitioner_instance_rebalancing_seconds{{application=\"{application}\",instance=\"{}\"}} {secs}",
                i.instance_id
            );
        }
        out
    }
}
