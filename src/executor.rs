use std::time::Duration;

use crate::domain::{ExecContext, ExecutionResult};

/// What the HTTP layer needs from the execution core.
#[mockall::automock]
#[async_trait::async_trait]
pub trait CodeExecutor: std::fmt::Debug + Send + Sync {
    async fn execute(&self, ctx: &ExecContext, code: &str) -> ExecutionResult;

    /// Per-execution interpreter timeout.
    fn timeout(&self) -> Duration;
}
