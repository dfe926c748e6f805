//! One-shot, multi-waiter readiness latch.
//!
//! Wraps the "network is up" rendezvous: the WiFi bring-up path signals
//! once, any number of tasks block on [`wait`](ReadyLatch::wait) until
//! then. Signalling is sticky — waiters arriving after the signal
//! return immediately, and repeated signals are harmless.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    ready: Mutex<bool>,
    cv: Condvar,
}

/// Cloneable handle to a shared one-shot latch.
#[derive(Debug, Clone, Default)]
pub struct ReadyLatch {
    inner: Arc<Inner>,
}

fn relock<'a, T>(res: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    // A poisoned latch mutex only means a waiter panicked mid-wait; the
    // boolean inside is still coherent.
    res.unwrap_or_else(PoisonError::into_inner)
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the latch ready and wake every waiter. Idempotent.
    pub fn signal(&self) {
        let mut ready = relock(self.inner.ready.lock());
        *ready = true;
        self.inner.cv.notify_all();
    }

    /// Non-blocking readiness check.
    pub fn is_ready(&self) -> bool {
        *relock(self.inner.ready.lock())
    }

    /// Block until the latch is signalled.
    pub fn wait(&self) {
        let mut ready = relock(self.inner.ready.lock());
        while !*ready {
            ready = relock(self.inner.cv.wait(ready));
        }
    }

    /// Block until signalled or `timeout` elapses. Returns readiness.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut ready = relock(self.inner.ready.lock());
        while !*ready {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .cv
                .wait_timeout(ready, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            ready = guard;
        }
        true
    }
}
