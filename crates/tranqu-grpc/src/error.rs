//! Error types for the gRPC service.

use thiserror::Error;
use tranqu_engine::EngineError;

use crate::config::ConfigError;

/// Result type for gRPC service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gRPC service.
///
/// Per-call variants never cross the wire: the orchestrator collapses them
/// into `TranspileStatus::Error`. Startup variants abort the process.
#[derive(Debug, Error)]
pub enum Error {
    /// A request field that must be JSON is not.
    #[error("Malformed input in `{field}`: {source}")]
    MalformedInput {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The transpilation engine failed or rejected the request.
    #[error("Engine failure: {0}")]
    Engine(#[from] EngineError),

    /// An engine result could not be encoded for the response.
    #[error("Failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The listener could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The gRPC transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The reflection service could not be built.
    #[error("Reflection error: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    /// The logging subsystem could not be initialized.
    #[error("Logging error: {0}")]
    Logging(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedInput { .. } => "malformed_input",
            Error::Engine(_) => "engine",
            Error::Encode(_) => "encode",
            Error::Config(_) => "config",
            Error::Bind { .. } => "bind",
            Error::Transport(_) => "transport",
            Error::Reflection(_) => "reflection",
            Error::Logging(_) => "logging",
            Error::Internal(_) => "internal",
        }
    }
}
