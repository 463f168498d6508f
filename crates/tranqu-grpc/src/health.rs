//! Health check and metrics HTTP endpoints.
//!
//! - /health - Basic liveness check
//! - /health/ready - Worker pool capacity
//! - /metrics - Prometheus metrics in text format

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::metrics::Metrics;
use crate::workers::WorkerPool;

/// Server uptime tracker.
static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

/// Initialize the start time (call once at server startup).
pub fn init_start_time() {
    START_TIME.get_or_init(SystemTime::now);
}

/// Get server uptime in seconds.
fn get_uptime_seconds() -> u64 {
    START_TIME
        .get()
        .and_then(|start| SystemTime::now().duration_since(*start).ok())
        .map_or(0, |d| d.as_secs())
}

/// Shared state for health check handlers.
#[derive(Clone)]
pub struct HealthState {
    pub workers: WorkerPool,
    pub metrics: Metrics,
}

impl HealthState {
    pub fn new(workers: WorkerPool, metrics: Metrics) -> Self {
        Self { workers, metrics }
    }
}

/// Response for /health endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Response for /health/ready endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub max_workers: usize,
    pub busy_workers: usize,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: get_uptime_seconds(),
    })
}

/// Ready while at least one worker is free.
async fn readiness_handler(State(state): State<HealthState>) -> Response {
    let response = ReadinessResponse {
        ready: state.workers.available() > 0,
        max_workers: state.workers.capacity(),
        busy_workers: state.workers.in_use(),
    };

    let status_code = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response)).into_response()
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(metrics) => (StatusCode::OK, metrics).into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to export metrics".to_string(),
        )
            .into_response(),
    }
}

/// Create the health check HTTP router.
pub fn create_health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the health endpoints on an already bound listener until the
/// process exits.
pub async fn serve_health(listener: TcpListener, state: HealthState) -> std::io::Result<()> {
    init_start_time();

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Health check server listening on {}", addr);
    }

    axum::serve(listener, create_health_router(state)).await
}
