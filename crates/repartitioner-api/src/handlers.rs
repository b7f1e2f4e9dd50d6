//! HTTP handlers.
//!
//! REST handlers return the `{success, data, error}` envelope. The health
//! endpoint returns the aggregate verdict as-is.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, warn};

use repartitioner_core::StreamRecord;
use repartitioner_health::HealthStatus;
use repartitioner_stream::{normalize_key, StreamError};
use repartitioner_table::TableEntry;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Health ─────────────────────────────────────────────────────

/// GET /actuator/health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let health = state.health.health();
    let status = match health.status {
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Up | HealthStatus::Unknown => StatusCode::OK,
    };
    (status, Json(health))
}

// ── Table ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// GET /api/v1/tables
pub async fn list_entries(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    match state.table.list_entries(params.limit.unwrap_or(100)) {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/tables/{key}
pub async fn get_entry(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let Some(key) = normalize_key(Some(&key)) else {
        return error_response("key required", StatusCode::BAD_REQUEST).into_response();
    };
    match state.table.get(&key) {
        Ok(Some(value)) => ApiResponse::ok(TableEntry { key, value }).into_response(),
        Ok(None) => error_response("key not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[derive(Deserialize)]
pub struct ChangelogParams {
    #[serde(default)]
    pub since: u64,
}

/// GET /api/v1/changelog
pub async fn changelog(
    State(state): State<ApiState>,
    Query(params): Query<ChangelogParams>,
) -> impl IntoResponse {
    match state.table.changelog_since(params.since) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Ingestion ──────────────────────────────────────────────────

/// Record body for the ingestion endpoint.
#[derive(Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub key: Option<String>,
    pub value: String,
}

/// POST /api/v1/topics/{topic}/records
pub async fn ingest_record(
    State(state): State<ApiState>,
    Path(topic): Path<String>,
    Json(req): Json<IngestRequest>,
) -> impl IntoResponse {
    let record = StreamRecord {
        key: req.key,
        value: req.value,
    };
    let key = record.key.clone();

    match state.registry.send(&topic, record).await {
        Ok(()) => {
            debug!(%topic, ?key, "record accepted");
            (
                StatusCode::ACCEPTED,
                ApiResponse::ok(serde_json::json!({ "topic": topic, "key": key })),
            )
                .into_response()
        }
        Err(e @ StreamError::UnknownTopic(_)) => {
            error_response(&e.to_string(), StatusCode::NOT_FOUND).into_response()
        }
        Err(e @ (StreamError::NoRuntime(_) | StreamError::NotAccepting { .. })) => {
            warn!(%topic, error = %e, "record rejected");
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let mut body = state.metrics.snapshot().render_prometheus(&state.application);
    body.push_str(&state.health.health().render_prometheus(&state.application));
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
