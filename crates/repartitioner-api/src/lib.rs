//! repartitioner-api: HTTP surface of the repartitioner daemon.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/actuator/health` | Aggregated runtime health (200 UP/UNKNOWN, 503 DOWN) |
//! | GET | `/api/v1/tables` | List materialized rows (`?limit=`) |
//! | GET | `/api/v1/tables/{key}` | Point lookup by key (normalized first) |
//! | GET | `/api/v1/changelog` | Table changelog after a sequence (`?since=`) |
//! | POST | `/api/v1/topics/{topic}/records` | Feed a record into the input topic |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use repartitioner_health::HealthIndicator;
use repartitioner_stream::{RuntimeRegistry, StageMetrics};
use repartitioner_table::KeyedTable;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub application: String,
    pub registry: Arc<RuntimeRegistry>,
    pub table: KeyedTable,
    pub health: Arc<HealthIndicator>,
    pub metrics: Arc<StageMetrics>,
}

/// Build the complete router (actuator + REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/tables", get(handlers::list_entries))
        .route("/tables/{key}", get(handlers::get_entry))
        .route("/changelog", get(handlers::changelog))
        .route("/topics/{topic}/records", post(handlers::ingest_record))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/actuator/health", get(handlers::health).with_state(state.clone()))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
