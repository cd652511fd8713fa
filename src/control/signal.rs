// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Cooperative cancellation flag.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A boolean flag with wake-up on change.
///
/// Long-running loops check [`Signal::is_raised`] between units of work and
/// sleep through [`Signal::wait_timeout`], so raising the signal interrupts
/// any pending delay immediately.
#[derive(Debug, Default)]
pub struct Signal {
    raised: Mutex<bool>,
    changed: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.raised.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raise the flag and wake every waiter.
    pub fn raise(&self) {
        *self.lock() = true;
        self.changed.notify_all();
    }

    pub fn clear(&self) {
        *self.lock() = false;
    }

    pub fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Sleep up to `timeout`, returning early if the flag is raised.
    ///
    /// Returns `true` if the flag is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut raised = self.lock();
        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            raised = match self.changed.wait_timeout(raised, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *raised
    }
}
