// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cooperative stop signal shared by every long-running loop.
//!
//! # Architecture
//! - Atomic flag checked by loops at each bounded wakeup
//! - Condvar so sleepers (the ticker) return as soon as stop is raised

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One-shot stop flag with blocking waits.
///
/// Once raised it stays raised. Loops poll [`is_stopped`](Self::is_stopped)
/// between bounded blocking calls; timed sleeps use
/// [`wait_until`](Self::wait_until) so they abort early.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl StopSignal {
    /// Create a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared signal wrapped in Arc.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Raise the signal and wake every sleeper.
    pub fn stop(&self) {
        // Store under the lock so a sleeper cannot miss the wakeup between
        // its flag check and its condvar wait.
        let _guard = self.lock.lock();
        self.stopped.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Check the flag (lock-free).
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sleep for at most `timeout`.
    ///
    /// Returns `true` if the signal is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    /// Block until the signal is raised.
    pub fn wait(&self) {
        let mut guard = self.lock.lock();
        while !self.is_stopped() {
            self.condvar.wait(&mut guard);
        }
    }

    /// Sleep until `deadline` or until stopped.
    ///
    /// Returns `true` if the signal is raised.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut guard = self.lock.lock();
        while !self.is_stopped() {
            if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_stopped()
    }
}

/// Cloneable handle that can only raise a [`StopSignal`].
///
/// Handed to signal handlers (Ctrl-C) and to callers that must not own the
/// snooper itself.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub(crate) fn new(signal: Arc<StopSignal>) -> Self {
        Self { signal }
    }

    /// Stop the snooper.
    pub fn stop(&self) {
        self.signal.stop();
    }

    /// Whether stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }
}
