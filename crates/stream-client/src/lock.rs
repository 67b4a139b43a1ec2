use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct LockState {
    is_streaming: bool,
    acquired_at:  Option<Instant>,
    generation:   u64,
}

/// Single-flight guard for one client instance. It only stops a logical
/// double submit from the same client; it is not a distributed lock.
#[derive(Debug, Clone)]
pub struct StreamLock {
    state:       Arc<Mutex<LockState>>,
    stale_after: Duration,
}

impl StreamLock {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState::default())),
            stale_after,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming
    }

    pub fn acquired_at(&self) -> Option<Instant> {
        self.state().acquired_at
    }

    /// Clears a lock older than `stale_after`, then takes it or fails with
    /// [`Error::Busy`].
    pub fn try_acquire(&self) -> Result<StreamPermit> {
        let mut state = self.state();
        let stale = state
            .acquired_at
            .is_some_and(|at| at.elapsed() > self.stale_after);
        if state.is_streaming && stale {
            warn!(generation = state.generation, "detected stale stream lock, resetting");
            state.is_streaming = false;
            state.acquired_at = None;
        }
        if state.is_streaming {
            warn!("stream already in progress, refusing new request");
            return Err(Error::Busy);
        }
        state.generation += 1;
        state.is_streaming = true;
        state.acquired_at = Some(Instant::now());
        debug!(generation = state.generation, "stream lock acquired");
        Ok(StreamPermit {
            lock:       self.clone(),
            generation: state.generation,
        })
    }

    /// Drops the lock whoever holds it.
    pub fn force_release(&self) {
        let mut state = self.state();
        state.is_streaming = false;
        state.acquired_at = None;
    }

    fn release(&self, generation: u64) {
        let mut state = self.state();
        // a holder that was reset as stale must not free its successor
        if state.generation == generation {
            state.is_streaming = false;
            state.acquired_at = None;
            debug!(generation, "stream lock released");
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its [`StreamLock`] when dropped.
#[derive(Debug)]
pub struct StreamPermit {
    lock:       StreamLock,
    generation: u64,
}

impl Drop for StreamPermit {
    fn drop(&mut self) {
        self.lock.release(self.generation);
    }
}
