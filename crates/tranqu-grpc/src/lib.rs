//! Tranqu gRPC Service
//!
//! This crate exposes quantum-program transpilation as a gRPC service. The
//! actual transpilation is delegated to an engine implementing
//! [`tranqu_engine::Transpiler`]; this crate owns the request protocol around
//! it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Tranqu gRPC Service                       │
//! │                                                               │
//! │  - serve             (server/mod.rs)     listener, reflection│
//! │  - TranspilerServiceImpl (server/service.rs) call lifecycle │
//! │  - normalize         (normalize.rs) wire → engine input      │
//! │  - WorkerPool        (workers.rs)   max_workers bound        │
//! │  - Config            (config.rs)    YAML + $ENV expansion    │
//! └─────────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//!                Arc<dyn tranqu_engine::Transpiler>
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tranqu_engine::{ProcessConfig, ProcessTranspiler};
//! use tranqu_grpc::proto::transpiler_service_server::TranspilerServiceServer;
//! use tranqu_grpc::server::TranspilerServiceImpl;
//! use tonic::transport::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(ProcessTranspiler::new(ProcessConfig::default()));
//!     let service = TranspilerServiceImpl::new(engine, 10);
//!
//!     Server::builder()
//!         .add_service(TranspilerServiceServer::new(service))
//!         .serve("[::]:50051".parse()?)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod proto;
pub mod server;
pub mod workers;

// Re-export commonly used types
pub use config::{Config, ConfigError, EngineConfig, ProtoConfig};
pub use error::{Error, Result};
pub use logging::{LogFormat, LoggingConfig, init_logging};
pub use metrics::Metrics;
pub use server::{TranspilerServiceImpl, serve};
pub use workers::WorkerPool;

/// Encoded file descriptor set for gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/tranqu_descriptor.bin"));

/// Fully qualified name of the transpiler service.
pub const SERVICE_NAME: &str = "tranqu_server.proto.v1.TranspilerService";
