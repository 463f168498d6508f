//! Error types for engine calls.

use thiserror::Error;

/// Errors reported by a transpilation engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine refused the input (unknown library, unknown device,
    /// malformed program, ...).
    #[error("Engine rejected the request: {0}")]
    Rejected(String),

    /// The engine process could not be started.
    #[error("Failed to start engine `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while talking to the engine.
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine answered with something that is not a transpile result.
    #[error("Malformed engine response: {0}")]
    Protocol(#[from] serde_json::Error),

    /// The engine reported success but produced no program.
    #[error("Engine returned an empty transpiled program")]
    EmptyProgram,
}

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;
