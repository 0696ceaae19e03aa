use std::time::Duration;

use crate::domain::ContextError;

/// Classification of a failed execution.
///
/// Every variant is returned to the caller next to whatever output was
/// captured; none of them is fatal to the pool.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("cancelled while waiting for an execution slot: {0}")]
    AdmissionCancelled(ContextError),

    #[error("cancelled while waiting for the execution result: {0}")]
    WaitCancelled(ContextError),

    #[error("execution timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("failed to {op}: {source}")]
    IoFailure {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start process: {0}")]
    SpawnFailure(#[source] std::io::Error),

    #[error("process failed: {0}")]
    ProcessFailure(String),

    #[error("runner pool is closed")]
    Closed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub(crate) fn io(op: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::IoFailure { op, source }
    }
}
