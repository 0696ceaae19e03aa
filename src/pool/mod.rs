//! Bounded-concurrency pool of interpreter runners.
//!
//! A caller's [`ExecContext`] only bounds how long that caller waits. When it
//! fires after a runner has started, the caller gets `WaitCancelled` and its
//! admission token is released at once, but the interpreter keeps running
//! until it exits or hits its own timeout. The number of live interpreter
//! processes can therefore exceed the pool capacity by the number of callers
//! that gave up mid-flight.

pub mod admission;
pub mod cache;

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{ExecContext, ExecutionResult};
use crate::executor::CodeExecutor;
use crate::pool::admission::{AdmissionControl, InFlightTracker};
use crate::pool::cache::RunnerCache;
use crate::runner::basic::RunnerConfig;
use crate::runner::errors::ExecutionError;

#[derive(Debug)]
pub struct RunnerPool {
    config: Arc<RunnerConfig>,
    admission: AdmissionControl,
    in_flight: InFlightTracker,
    cache: Arc<RunnerCache>,
}

impl RunnerPool {
    /// Capacity below one is raised to one.
    pub fn new(config: RunnerConfig, max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        let config = Arc::new(config);

        Self {
            admission: AdmissionControl::new(capacity),
            in_flight: InFlightTracker::new(),
            cache: Arc::new(RunnerCache::new(config.clone(), capacity)),
            config,
        }
    }

    #[tracing::instrument(skip_all, fields(execution_id = %Uuid::new_v4()))]
    pub async fn execute(&self, ctx: &ExecContext, code: &str) -> ExecutionResult {
        let Some(_in_flight) = self.in_flight.enter() else {
            return ExecutionError::Closed.into();
        };

        let _permit = match self.admission.acquire(ctx).await {
            Ok(permit) => permit,
            Err(err) => {
                tracing::debug!("Not admitted: {}", err);
                return err.into();
            }
        };

        let runner = self.cache.acquire();
        let cache = self.cache.clone();
        let code = code.to_owned();
        let mut task = tokio::spawn(
            async move {
                let result = runner.execute(&code).await;
                cache.release(runner);
                result
            }
            .in_current_span(),
        );

        tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(result) => {
                    tracing::debug!("Execution finished, error={:?}", result.error);
                    result
                }
                Err(e) => {
                    tracing::error!("Runner task failed: {}", e);
                    ExecutionError::Internal(format!("runner task failed: {}", e)).into()
                }
            },
            err = ctx.done() => {
                tracing::warn!("Caller stopped waiting ({}), interpreter left to finish on its own", err);
                ExecutionError::WaitCancelled(err).into()
            }
        }
    }

    /// Waits for every `execute` call to return, then closes the pool.
    ///
    /// Interpreters detached by cancelled callers may still be running.
    pub async fn drain(&self) {
        tracing::info!(
            "Draining runner pool, {} executions in flight",
            self.in_flight.count()
        );
        self.in_flight.close_when_idle().await;
        self.admission.close();
        tracing::info!("Runner pool closed");
    }

    pub fn capacity(&self) -> usize {
        self.admission.capacity()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    pub fn is_closed(&self) -> bool {
        self.in_flight.is_closed()
    }

    pub fn cache(&self) -> &RunnerCache {
        &self.cache
    }
}

#[async_trait::async_trait]
impl CodeExecutor for RunnerPool {
    async fn execute(&self, ctx: &ExecContext, code: &str) -> ExecutionResult {
        RunnerPool::execute(self, ctx, code).await
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}
