//! Counting completion latch.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::TransportError;

#[derive(Debug)]
struct LatchState {
    remaining: usize,
    aborted: bool,
}

/// Releases waiters once a fixed number of independent signals arrived.
///
/// The executor waits on a latch of two: one count for the output stream
/// closing and one for the error stream closing. A latch can also be
/// aborted, which releases waiters with [`TransportError::Interrupted`].
#[derive(Debug)]
pub struct CompletionLatch {
    state: Mutex<LatchState>,
    cond: Condvar,
}

impl CompletionLatch {
    /// Create a latch that opens after `count` signals.
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(LatchState {
                remaining: count,
                aborted: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Record one signal. Extra signals after the latch opened are ignored.
    pub fn count_down(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.remaining > 0 {
            state.remaining -= 1;
            if state.remaining == 0 {
                self.cond.notify_all();
            }
        }
    }

    /// Number of signals still outstanding.
    pub fn count(&self) -> usize {
        self.state.lock().map(|s| s.remaining).unwrap_or(0)
    }

    /// Release all waiters with an interruption.
    pub fn abort(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.aborted = true;
            self.cond.notify_all();
        }
    }

    /// Whether [`abort`](Self::abort) was called.
    pub fn is_aborted(&self) -> bool {
        self.state.lock().map(|s| s.aborted).unwrap_or(false)
    }

    /// Block until every signal arrived.
    ///
    /// With a `deadline`, gives up after that long with
    /// [`TransportError::TimedOut`]. An abort wins over completion only if
    /// it is observed before the last signal.
    pub fn wait(&self, deadline: Option<Duration>) -> Result<(), TransportError> {
        let started = Instant::now();
        let mut state = self
            .state
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?;

        loop {
            if state.remaining == 0 {
                return Ok(());
            }
            if state.aborted {
                return Err(TransportError::Interrupted);
            }

            state = match deadline {
                None => self
                    .cond
                    .wait(state)
                    .map_err(|_| TransportError::LockPoisoned)?,
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        return Err(TransportError::TimedOut(limit));
                    }
                    self.cond
                        .wait_timeout(state, limit - elapsed)
                        .map_err(|_| TransportError::LockPoisoned)?
                        .0
                }
            };
        }
    }
}
