//! Prometheus metrics for the transpiler service.
//!
//! - Transpile calls, labeled by final status
//! - Failures, labeled by error kind
//! - Call duration
//! - Calls currently holding a worker

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    /// Counter for finished transpile calls, labeled by status ("ok" / "error")
    pub static ref TRANSPILE_REQUESTS: CounterVec = register_counter_vec!(
        "tranqu_transpile_requests_total",
        "Total number of transpile calls",
        &["status"]
    )
    .unwrap();

    /// Counter for failed transpile calls, labeled by error kind
    pub static ref TRANSPILE_FAILURES: CounterVec = register_counter_vec!(
        "tranqu_transpile_failures_total",
        "Total number of failed transpile calls",
        &["kind"]
    )
    .unwrap();

    /// Histogram for transpile call duration in seconds
    pub static ref TRANSPILE_DURATION: Histogram = register_histogram!(
        "tranqu_transpile_duration_seconds",
        "Transpile call duration in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();

    /// Gauge for calls currently running in the engine
    pub static ref ACTIVE_TRANSPILES: Gauge = register_gauge!(
        "tranqu_active_transpiles",
        "Number of transpile calls currently holding a worker"
    )
    .unwrap();
}

/// Metrics recorder for the transpiler service.
///
/// The actual metrics are stored in global static variables (`lazy_static`).
#[derive(Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished call.
    pub fn record_finished(&self, ok: bool, elapsed_seconds: f64) {
        let status = if ok { "ok" } else { "error" };
        TRANSPILE_REQUESTS.with_label_values(&[status]).inc();
        TRANSPILE_DURATION.observe(elapsed_seconds);
    }

    /// Record the kind of a failure.
    pub fn record_failure(&self, kind: &str) {
        TRANSPILE_FAILURES.with_label_values(&[kind]).inc();
    }

    pub fn engine_call_started(&self) {
        ACTIVE_TRANSPILES.inc();
    }

    pub fn engine_call_finished(&self) {
        ACTIVE_TRANSPILES.dec();
    }

    /// Get current metrics as Prometheus text format.
    pub fn export(&self) -> Result<String, std::fmt::Error> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|_| std::fmt::Error)?;

        String::from_utf8(buffer).map_err(|_| std::fmt::Error)
    }
}
