use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::runner::basic::{BasicRunner, RunnerConfig};

/// Bounded free-list of idle runners.
///
/// `acquire` never blocks: it pops an idle runner or builds a fresh one.
/// `release` keeps at most `capacity` runners around and drops the rest.
#[derive(Debug)]
pub struct RunnerCache {
    config: Arc<RunnerConfig>,
    idle: Mutex<Vec<BasicRunner>>,
    capacity: usize,
    created: AtomicUsize,
}

impl RunnerCache {
    pub fn new(config: Arc<RunnerConfig>, capacity: usize) -> Self {
        Self {
            config,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            created: AtomicUsize::new(0),
        }
    }

    pub fn acquire(&self) -> BasicRunner {
        let cached = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        cached.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Runner cache empty, creating a new runner");
            BasicRunner::new(self.config.clone())
        })
    }

    pub fn release(&self, runner: BasicRunner) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.capacity {
            idle.push(runner);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total runners ever built by this cache.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}
