//! The transpilation capability.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{TranspileInput, TranspileOutput};

/// A transpilation engine.
///
/// Implementations must be `Send + Sync`: the server holds a single
/// `Arc<dyn Transpiler>` for its whole lifetime and calls it from every
/// worker. An engine that cannot tolerate overlapping calls should be wrapped
/// in [`Serialized`](crate::Serialized).
///
/// A call may block for an unbounded time. Callers apply no timeout.
#[async_trait]
pub trait Transpiler: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Transpile one program.
    async fn transpile(&self, input: TranspileInput) -> EngineResult<TranspileOutput>;
}
