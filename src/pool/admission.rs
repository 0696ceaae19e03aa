use std::sync::{Mutex, PoisonError};

use tokio::sync::{Notify, Semaphore, SemaphorePermit};

use crate::domain::ExecContext;
use crate::runner::errors::ExecutionError;

/// Counting semaphore bounding concurrent executions.
///
/// No fairness is promised between waiting callers.
#[derive(Debug)]
pub struct AdmissionControl {
    semaphore: Semaphore,
    capacity: usize,
}

impl AdmissionControl {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Waits for a token unless `ctx` finishes first.
    ///
    /// An already finished context always loses, even if a token is free.
    pub async fn acquire(&self, ctx: &ExecContext) -> Result<SemaphorePermit<'_>, ExecutionError> {
        tokio::select! {
            biased;
            err = ctx.done() => Err(ExecutionError::AdmissionCancelled(err)),
            permit = self.semaphore.acquire() => permit.map_err(|_| ExecutionError::Closed),
        }
    }

    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    in_flight: usize,
    closed: bool,
}

/// Counts `execute` calls that have not returned yet.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    state: Mutex<TrackerState>,
    idle: Notify,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call, or returns `None` once the tracker is closed.
    pub fn enter(&self) -> Option<InFlightGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        state.in_flight += 1;
        Some(InFlightGuard { tracker: self })
    }

    /// Waits until nothing is in flight, then closes.
    ///
    /// The zero check and the close happen under one lock, so no call can
    /// slip in between them.
    pub async fn close_when_idle(&self) {
        loop {
            let notified = self.idle.notified();
            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.in_flight == 0 {
                    state.closed = true;
                    return;
                }
            }
            notified.await;
        }
    }

    pub fn count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    fn leave(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.idle.notify_waiters();
        }
    }
}

pub struct InFlightGuard<'a> {
    tracker: &'a InFlightTracker,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.tracker.leave();
    }
}
