//! Tranqu transpilation engine boundary.
//!
//! The server never transpiles anything itself. It hands a normalized
//! [`TranspileInput`] to an implementation of [`Transpiler`] and receives a
//! [`TranspileOutput`] or an [`EngineError`].
//!
//! # Adapters
//!
//! | Adapter | Use |
//! |---------|-----|
//! | [`ProcessTranspiler`] | Runs the Tranqu engine as a child process (JSON over stdio) |
//! | [`Serialized`] | Wraps an engine that must not be called concurrently |
//!
//! # Example
//!
//! ```ignore
//! use tranqu_engine::{ProcessConfig, ProcessTranspiler, Transpiler, TranspileInput};
//!
//! let engine = ProcessTranspiler::new(ProcessConfig::default());
//! let output = engine.transpile(TranspileInput::new(qasm)).await?;
//! println!("{}", output.transpiled_program);
//! ```

pub mod error;
pub mod process;
pub mod serialized;
pub mod transpiler;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use process::{ProcessConfig, ProcessTranspiler};
pub use serialized::Serialized;
pub use transpiler::Transpiler;
pub use types::{
    CircuitStats, IndexMapping, TranspileInput, TranspileOutput, TranspileStats,
    VirtualPhysicalMapping,
};
