//! Service host: wires configuration, engine, listener and reflection.
//!
//! ```text
//!  config.yaml ──▶ Config ─┬─▶ engine (ProcessTranspiler [+ Serialized])
//!                          ├─▶ WorkerPool(max_workers)
//!                          └─▶ TcpListener(address)
//!                                   │
//!                  tonic Server ◀───┘
//!                   ├─ tranqu_server.proto.v1.TranspilerService
//!                   ├─ grpc.reflection.v1.ServerReflection
//!                   └─ grpc.reflection.v1alpha.ServerReflection
//! ```

pub mod service;

pub use service::TranspilerServiceImpl;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info, warn};
use tranqu_engine::{ProcessTranspiler, Serialized, Transpiler};

use crate::FILE_DESCRIPTOR_SET;
use crate::config::{Config, EngineConfig, ProtoConfig};
use crate::error::{Error, Result};
use crate::health::{HealthState, serve_health};
use crate::logging::{LoggingConfig, init_logging};
use crate::metrics::Metrics;
use crate::proto::transpiler_service_server::TranspilerServiceServer;
use crate::workers::WorkerPool;

/// Initialize logging, then serve until SIGINT/SIGTERM.
pub async fn serve(config: &Config, logging: &LoggingConfig) -> Result<()> {
    init_logging(logging)?;

    let address = config.listen_address()?;
    let engine = build_engine(&config.engine);
    let workers = WorkerPool::new(config.proto.max_workers);

    if let Some(http_address) = config.http_address() {
        let listener = bind(http_address).await?;
        let state = HealthState::new(workers.clone(), Metrics::new());
        tokio::spawn(async move {
            if let Err(e) = serve_health(listener, state).await {
                error!(error = %e, "Health server error");
            }
        });
    }

    let listener = bind(address).await?;
    info!(
        "Server is running on {}. max_workers={}",
        config.proto.address, config.proto.max_workers
    );

    let service = TranspilerServiceImpl::with_workers(engine, workers);
    run(listener, service, &config.proto, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

/// Construct the engine described by `config`.
pub fn build_engine(config: &EngineConfig) -> Arc<dyn Transpiler> {
    let engine = ProcessTranspiler::new(config.process.clone());
    if config.serialize {
        Arc::new(Serialized::new(engine))
    } else {
        Arc::new(engine)
    }
}

/// Bind a TCP listener.
pub async fn bind(address: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(address).await.map_err(|source| Error::Bind {
        address: address.to_string(),
        source,
    })
}

/// Serve `service` on `listener` until `shutdown` resolves.
///
/// After `shutdown` resolves, in-flight calls get
/// `proto.shutdown_timeout_seconds` to finish before they are abandoned.
pub async fn run<F>(
    listener: TcpListener,
    service: TranspilerServiceImpl,
    proto: &ProtoConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let reflection_v1 = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;
    let reflection_v1alpha = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1alpha()?;

    let transpiler = TranspilerServiceServer::new(service)
        .max_decoding_message_size(proto.max_message_size_bytes)
        .max_encoding_message_size(proto.max_message_size_bytes);

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = Server::builder()
        .add_service(transpiler)
        .add_service(reflection_v1)
        .add_service(reflection_v1alpha)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.await;
            let _ = stopping_tx.send(());
        });
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = stopping_rx => {
            info!(timeout_secs = proto.shutdown_timeout_seconds, "Waiting for in-flight calls");
            let grace = Duration::from_secs(proto.shutdown_timeout_seconds);
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!("Shutdown timeout elapsed, abandoning in-flight calls"),
            }
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Received shutdown signal, initiating graceful shutdown");
}
