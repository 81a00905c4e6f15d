//! Graceful shutdown coordination.
//!
//! - 1st signal, idle: the scheduler stops at its next sleep slice.
//! - 1st signal, cycle in flight: wait for the cycle and the state write after it.
//! - 2nd signal while waiting: exit immediately (may leave state mid-write).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

/// What the signal handler should do after a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Nothing in flight; the scheduler will return on its own.
    ExitNow,
    /// A cycle is running; shutdown happens once it is recorded.
    Deferred,
    /// Repeated request while deferred; exit the process now.
    Force,
}

#[derive(Debug, Default)]
struct Inner {
    token: CancellationToken,
    in_flight: AtomicBool,
    requests: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn is_requested(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn cycle_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn request(&self) -> SignalAction {
        let previous = self.inner.requests.fetch_add(1, Ordering::SeqCst);
        self.inner.token.cancel();
        if !self.cycle_in_flight() {
            SignalAction::ExitNow
        } else if previous == 0 {
            SignalAction::Deferred
        } else {
            SignalAction::Force
        }
    }

    /// Marks a cycle as in flight until the guard is dropped.
    pub fn begin_cycle(&self) -> CycleInFlight {
        self.inner.in_flight.store(true, Ordering::SeqCst);
        CycleInFlight {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Debug)]
pub struct CycleInFlight {
    inner: Arc<Inner>,
}

impl Drop for CycleInFlight {
    fn drop(&mut self) {
        self.inner.in_flight.store(false, Ordering::SeqCst);
    }
}
