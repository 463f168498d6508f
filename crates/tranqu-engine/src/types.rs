//! Engine input and output types.
//!
//! The field names double as the JSON wire format of the process adapter and
//! of the `stats` / `virtual_physical_mapping` response payloads, so they
//! must not be renamed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// A normalized transpile request.
///
/// Every optional field is `None` when the caller left it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranspileInput {
    /// Program text, passed through untouched (may be empty).
    pub program: String,
    /// Dialect of `program`, e.g. `openqasm3`.
    pub program_lib: Option<String>,
    /// Transpiler library to use, e.g. `qiskit`.
    pub transpiler_lib: Option<String>,
    /// Library specific transpiler options.
    pub transpiler_options: Option<Value>,
    /// Target device description.
    pub device: Option<Value>,
    /// Format of `device`, e.g. `oqtopus`.
    pub device_lib: Option<String>,
}

impl TranspileInput {
    /// Create an input carrying only a program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_program_lib(mut self, lib: impl Into<String>) -> Self {
        self.program_lib = Some(lib.into());
        self
    }

    pub fn with_transpiler_lib(mut self, lib: impl Into<String>) -> Self {
        self.transpiler_lib = Some(lib.into());
        self
    }

    pub fn with_transpiler_options(mut self, options: Value) -> Self {
        self.transpiler_options = Some(options);
        self
    }

    pub fn with_device(mut self, device: Value, device_lib: impl Into<String>) -> Self {
        self.device = Some(device);
        self.device_lib = Some(device_lib.into());
        self
    }
}

/// Circuit metrics before or after transpilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitStats {
    pub n_qubits: u64,
    pub n_gates: u64,
    pub n_gates_1q: u64,
    pub n_gates_2q: u64,
    pub depth: u64,
}

/// Circuit metrics of the input and of the transpiled program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranspileStats {
    pub before: CircuitStats,
    pub after: CircuitStats,
}

/// Virtual index to physical index.
///
/// Keys travel as JSON object keys (`{"0": 3}`) and are kept in numeric
/// order, so `"10"` follows `"9"` on the wire.
pub type IndexMapping = BTreeMap<u64, u64>;

/// Layout chosen by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPhysicalMapping {
    pub qubit_mapping: IndexMapping,
    pub bit_mapping: IndexMapping,
}

/// A successful transpilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranspileOutput {
    pub transpiled_program: String,
    pub stats: TranspileStats,
    pub virtual_physical_mapping: VirtualPhysicalMapping,
}

impl TranspileOutput {
    /// Reject outputs that cannot be reported as a success.
    pub fn ensure_program(self) -> EngineResult<Self> {
        if self.transpiled_program.is_empty() {
            return Err(EngineError::EmptyProgram);
        }
        Ok(self)
    }
}
