//! Exclusive access to engines that are not safe for concurrent calls.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::EngineResult;
use crate::transpiler::Transpiler;
use crate::types::{TranspileInput, TranspileOutput};

/// Runs at most one call into the wrapped engine at a time.
///
/// Waiting callers queue on an async mutex in FIFO order.
pub struct Serialized<T> {
    inner: T,
    gate: Mutex<()>,
}

impl<T> Serialized<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: Transpiler> Transpiler for Serialized<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn transpile(&self, input: TranspileInput) -> EngineResult<TranspileOutput> {
        let _guard = self.gate.lock().await;
        self.inner.transpile(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TranspileStats, VirtualPhysicalMapping};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts overlapping calls.
    #[derive(Default)]
    struct Overlap {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transpiler for Overlap {
        fn name(&self) -> &str {
            "overlap"
        }

        async fn transpile(&self, input: TranspileInput) -> EngineResult<TranspileOutput> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(TranspileOutput {
                transpiled_program: input.program,
                stats: TranspileStats::default(),
                virtual_physical_mapping: VirtualPhysicalMapping::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_calls_never_overlap() {
        let engine = Arc::new(Serialized::new(Overlap::default()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.transpile(TranspileInput::new(format!("p{i}"))).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(engine.name(), "overlap");
        let engine = Arc::try_unwrap(engine).ok().unwrap().into_inner();
        assert_eq!(engine.peak.load(Ordering::SeqCst), 1);
    }
}
