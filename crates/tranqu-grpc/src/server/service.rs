//! `TranspilerService` implementation.
//!
//! Every call goes through the same lifecycle:
//!
//! ```text
//!  started ──▶ normalize ──▶ worker ──▶ engine ──▶ encode ──▶ OK
//!     │            │                       │          │
//!     │            └──────────┬────────────┴──────────┘
//!     │                       ▼
//!     │                    ERROR (payload empty, detail only in logs)
//!     ▼
//!  finished (exactly once, from a drop guard)
//! ```
//!
//! Failures never reach the client as gRPC errors. The RPC always succeeds
//! and `status` carries the outcome.

use std::sync::Arc;
use std::time::Instant;

use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument};
use tranqu_engine::{TranspileOutput, Transpiler};

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::normalize::normalize;
use crate::proto::{
    TranspileRequest, TranspileResponse, TranspileStatus, transpiler_service_server,
};
use crate::workers::WorkerPool;

/// Tranqu gRPC service implementation.
pub struct TranspilerServiceImpl {
    engine: Arc<dyn Transpiler>,
    workers: WorkerPool,
    metrics: Metrics,
}

impl TranspilerServiceImpl {
    /// Create a service over `engine` with `max_workers` concurrent calls.
    pub fn new(engine: Arc<dyn Transpiler>, max_workers: usize) -> Self {
        Self::with_workers(engine, WorkerPool::new(max_workers))
    }

    /// Create a service sharing an existing worker pool.
    pub fn with_workers(engine: Arc<dyn Transpiler>, workers: WorkerPool) -> Self {
        Self {
            engine,
            workers,
            metrics: Metrics::new(),
        }
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Handle one transpile request. Never fails: every error becomes
    /// `TranspileStatus::Error`.
    #[instrument(name = "transpile", skip_all, fields(request_id = %request.request_id))]
    pub async fn transpile_request(&self, request: TranspileRequest) -> TranspileResponse {
        let mut call = FinishGuard::start(&request.request_id, self.metrics.clone());

        info!(request_id = %request.request_id, "Transpile is started.");
        debug!(
            request_id = %request.request_id,
            program = %request.program,
            program_lib = %request.program_lib,
            transpiler_lib = %request.transpiler_lib,
            transpiler_options = %request.transpiler_options,
            device = %request.device,
            device_lib = %request.device_lib,
            "received parameter"
        );

        let response = match self.run(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    request_id = %request.request_id,
                    kind = e.kind(),
                    error = %e,
                    details = ?e,
                    "Transpile failed. Exception occurred."
                );
                self.metrics.record_failure(e.kind());
                failure_response()
            }
        };

        call.status = response.status();
        response
    }

    async fn run(&self, request: &TranspileRequest) -> Result<TranspileResponse> {
        let input = normalize(request)?;

        let output = {
            let _worker = self.workers.acquire().await?;
            debug!(engine = self.engine.name(), "Calling transpiler");
            self.engine.transpile(input).await?
        };

        success_response(output.ensure_program()?)
    }
}

/// Build an OK response from an engine result.
pub fn success_response(output: TranspileOutput) -> Result<TranspileResponse> {
    let stats = serde_json::to_string(&output.stats).map_err(Error::Encode)?;
    let mapping =
        serde_json::to_string(&output.virtual_physical_mapping).map_err(Error::Encode)?;

    Ok(TranspileResponse {
        status: TranspileStatus::Ok as i32,
        transpiled_program: output.transpiled_program,
        stats,
        virtual_physical_mapping: mapping,
    })
}

/// The single failure response: status ERROR, every payload field empty.
pub fn failure_response() -> TranspileResponse {
    TranspileResponse {
        status: TranspileStatus::Error as i32,
        ..Default::default()
    }
}

/// Emits the "finished" event when dropped.
///
/// The status starts as `Error` and is overwritten once a response exists, so
/// a call that panics or whose future is dropped is still reported exactly
/// once, as a failure.
struct FinishGuard {
    request_id: String,
    started: Instant,
    status: TranspileStatus,
    metrics: Metrics,
}

impl FinishGuard {
    fn start(request_id: &str, metrics: Metrics) -> Self {
        Self {
            request_id: request_id.to_string(),
            started: Instant::now(),
            status: TranspileStatus::Error,
            metrics,
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let elapsed_time = self.started.elapsed().as_secs_f64();
        info!(
            request_id = %self.request_id,
            elapsed_time,
            status = self.status as i32,
            "Transpile is finished."
        );
        self.metrics
            .record_finished(self.status == TranspileStatus::Ok, elapsed_time);
    }
}

#[tonic::async_trait]
impl transpiler_service_server::TranspilerService for TranspilerServiceImpl {
    async fn transpile(
        &self,
        request: Request<TranspileRequest>,
    ) -> std::result::Result<Response<TranspileResponse>, Status> {
        Ok(Response::new(self.transpile_request(request.into_inner()).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tranqu_engine::{
        CircuitStats, EngineError, EngineResult, TranspileInput, TranspileStats,
        VirtualPhysicalMapping,
    };
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    // ---- log capture ----

    #[derive(Debug, Clone)]
    struct Captured {
        level: Level,
        fields: HashMap<String, String>,
    }

    impl Captured {
        fn message(&self) -> &str {
            self.fields.get("message").map_or("", String::as_str)
        }
    }

    #[derive(Clone, Default)]
    struct CaptureLayer(Arc<Mutex<Vec<Captured>>>);

    impl CaptureLayer {
        fn events(&self) -> Vec<Captured> {
            self.0.lock().unwrap().clone()
        }

        fn finished(&self) -> Vec<Captured> {
            self.events()
                .into_iter()
                .filter(|e| e.message() == "Transpile is finished.")
                .collect()
        }
    }

    #[derive(Default)]
    struct FieldVisitor(HashMap<String, String>);

    impl Visit for FieldVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_f64(&mut self, field: &Field, value: f64) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_i64(&mut self, field: &Field, value: i64) {
            self.0.insert(field.name().to_string(), value.to_string());
        }
    }

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = FieldVisitor::default();
            event.record(&mut visitor);
            self.0.lock().unwrap().push(Captured {
                level: *event.metadata().level(),
                fields: visitor.0,
            });
        }
    }

    fn capture() -> (CaptureLayer, tracing::subscriber::DefaultGuard) {
        let layer = CaptureLayer::default();
        let guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(layer.clone()));
        (layer, guard)
    }

    // ---- engines ----

    /// Accepts only `device_lib = "oqtopus"`.
    struct OqtopusOnly;

    #[async_trait]
    impl Transpiler for OqtopusOnly {
        fn name(&self) -> &str {
            "oqtopus-only"
        }

        async fn transpile(&self, input: TranspileInput) -> EngineResult<TranspileOutput> {
            match input.device_lib.as_deref() {
                Some("oqtopus") => Ok(TranspileOutput {
                    transpiled_program: "OPENQASM 3.0;\ncx $0, $1;\n".to_string(),
                    stats: TranspileStats {
                        before: CircuitStats { n_qubits: 2, n_gates: 1, n_gates_1q: 0, n_gates_2q: 1, depth: 1 },
                        after: CircuitStats { n_qubits: 4, n_gates: 1, n_gates_1q: 0, n_gates_2q: 1, depth: 1 },
                    },
                    virtual_physical_mapping: VirtualPhysicalMapping {
                        qubit_mapping: [(0, 0), (1, 1)].into(),
                        bit_mapping: Default::default(),
                    },
                }),
                other => Err(EngineError::Rejected(format!("unsupported device_lib: {other:?}"))),
            }
        }
    }

    /// Returns an empty program.
    struct Hollow;

    #[async_trait]
    impl Transpiler for Hollow {
        fn name(&self) -> &str {
            "hollow"
        }

        async fn transpile(&self, _input: TranspileInput) -> EngineResult<TranspileOutput> {
            Ok(TranspileOutput {
                transpiled_program: String::new(),
                stats: TranspileStats::default(),
                virtual_physical_mapping: VirtualPhysicalMapping::default(),
            })
        }
    }

    /// Never finishes.
    struct Stuck;

    #[async_trait]
    impl Transpiler for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn transpile(&self, _input: TranspileInput) -> EngineResult<TranspileOutput> {
            std::future::pending().await
        }
    }

    fn request(device_lib: &str) -> TranspileRequest {
        TranspileRequest {
            request_id: "test_id".to_string(),
            program: "OPENQASM 3.0;\nqubit[2] q;\ncx q[0], q[1];\n".to_string(),
            program_lib: "openqasm3".to_string(),
            transpiler_lib: "qiskit".to_string(),
            transpiler_options: json!({"basis_gates": ["cx"]}).to_string(),
            device: json!({"device_id": "fake_device"}).to_string(),
            device_lib: device_lib.to_string(),
        }
    }

    fn service(engine: impl Transpiler + 'static) -> TranspilerServiceImpl {
        TranspilerServiceImpl::new(Arc::new(engine), 2)
    }

    // ---- tests ----

    #[tokio::test]
    async fn test_success_response() {
        let (logs, _guard) = capture();
        let response = service(OqtopusOnly).transpile_request(request("oqtopus")).await;

        assert_eq!(response.status(), TranspileStatus::Ok);
        assert!(!response.transpiled_program.is_empty());

        let stats: serde_json::Value = serde_json::from_str(&response.stats).unwrap();
        assert_eq!(stats["before"]["n_qubits"], 2);
        assert_eq!(stats["after"]["n_qubits"], 4);

        let mapping: serde_json::Value =
            serde_json::from_str(&response.virtual_physical_mapping).unwrap();
        assert_eq!(mapping, json!({"qubit_mapping": {"0": 0, "1": 1}, "bit_mapping": {}}));

        let finished = logs.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].level, Level::INFO);
        assert_eq!(finished[0].fields["status"], "0");
        assert_eq!(finished[0].fields["request_id"], "test_id");
    }

    #[tokio::test]
    async fn test_engine_rejection_collapses_to_error() {
        let (logs, _guard) = capture();
        let response = service(OqtopusOnly)
            .transpile_request(request("invalid_device_lib"))
            .await;

        assert_eq!(response.status(), TranspileStatus::Error);
        assert_eq!(response.transpiled_program, "");
        assert_eq!(response.stats, "");
        assert_eq!(response.virtual_physical_mapping, "");

        let events = logs.events();
        let failure = events
            .iter()
            .find(|e| e.level == Level::ERROR)
            .expect("failure is logged");
        assert_eq!(failure.fields["request_id"], "test_id");
        assert!(failure.fields["error"].contains("invalid_device_lib"));

        let finished = logs.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].fields["status"], "1");
        assert!(finished[0].fields["elapsed_time"].parse::<f64>().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_malformed_json_collapses_to_error() {
        let (logs, _guard) = capture();
        let mut bad = request("oqtopus");
        bad.transpiler_options = "invalid_json".to_string();

        let response = service(OqtopusOnly).transpile_request(bad).await;

        assert_eq!(response, failure_response());
        let failure = logs
            .events()
            .into_iter()
            .find(|e| e.level == Level::ERROR)
            .unwrap();
        assert_eq!(failure.fields["kind"], "malformed_input");
        assert_eq!(logs.finished().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_program_from_engine_is_error() {
        let response = service(Hollow).transpile_request(request("oqtopus")).await;
        assert_eq!(response, failure_response());
    }

    #[tokio::test]
    async fn test_start_and_debug_events() {
        let (logs, _guard) = capture();
        let mut req = request("oqtopus");
        req.request_id = String::new();

        service(OqtopusOnly).transpile_request(req).await;

        let events = logs.events();
        let started = events
            .iter()
            .find(|e| e.message() == "Transpile is started.")
            .unwrap();
        assert_eq!(started.level, Level::INFO);
        assert_eq!(started.fields["request_id"], "");

        let received = events
            .iter()
            .find(|e| e.message() == "received parameter")
            .unwrap();
        assert_eq!(received.level, Level::DEBUG);
        assert_eq!(received.fields["device_lib"], "oqtopus");
        assert_eq!(received.fields["program_lib"], "openqasm3");
        assert!(received.fields.contains_key("transpiler_options"));
    }

    #[tokio::test]
    async fn test_finish_fires_when_call_is_abandoned() {
        let (logs, _guard) = capture();
        let service = service(Stuck);

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            service.transpile_request(request("oqtopus")),
        )
        .await;

        assert!(outcome.is_err());
        let finished = logs.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].fields["status"], "1");
        assert_eq!(service.workers().available(), 2);
    }

    #[tokio::test]
    async fn test_grpc_entry_point() {
        use transpiler_service_server::TranspilerService;

        let response = service(OqtopusOnly)
            .transpile(Request::new(request("oqtopus")))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.status(), TranspileStatus::Ok);
    }
}
