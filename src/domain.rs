use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::runner::errors::ExecutionError;

/// Why a caller stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Caller-side cancellation signal with an optional deadline.
///
/// Only bounds how long the caller waits. It is never propagated into the
/// interpreter process, which lives by its own timeout.
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the reason the context is done, if it already is.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }
}

/// Where a runner materializes the submitted code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkspaceMode {
    /// Single temp file in the shared temp location.
    #[default]
    File,
    /// Private temp directory, also used as the interpreter's working dir.
    #[value(name = "dir")]
    Directory,
}

/// Merged output of one execution plus its classification.
///
/// `output` holds whatever the interpreter wrote, even when `error` is set.
#[derive(Debug)]
pub struct ExecutionResult {
    pub output: String,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    pub fn success(output: String) -> Self {
        Self {
            output,
            error: None,
        }
    }

    pub fn failure(output: String, error: ExecutionError) -> Self {
        Self {
            output,
            error: Some(error),
        }
    }

    /// Failure that happened before any output could exist.
    pub fn rejected(error: ExecutionError) -> Self {
        Self::failure(String::new(), error)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<ExecutionError> for ExecutionResult {
    fn from(error: ExecutionError) -> Self {
        Self::rejected(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_context_is_done_immediately() {
        let ctx = ExecContext::new();
        ctx.cancel();

        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = ExecContext::with_timeout(Duration::from_millis(50));
        assert_eq!(ctx.err(), None);

        let started = Instant::now();
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_pending_deadline() {
        let ctx = ExecContext::with_timeout(Duration::from_secs(60));
        let clone = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            clone.cancel();
        });

        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }

    #[test]
    fn test_context_without_deadline_is_not_done() {
        let ctx = ExecContext::new();
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.err(), None);
    }
}
