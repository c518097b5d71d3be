//! Atomic bit-flag register shared between the update worker and callers
//!
//! Every mutation is a single atomic read-modify-write on the bit value. The
//! mutex/condvar pair only parks waiters; it never guards the bits themselves,
//! so `snapshot` stays lock-free.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bitflags::bitflags;

bitflags! {
    /// Signals exchanged between the worker thread and its callers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Worker loop is alive and waiting for work
        const WORKER_RUNNING = 1 << 0;
        /// A trigger is pending pickup by the worker
        const START_REQUESTED = 1 << 1;
        /// Worker is actively downloading
        const REQUEST_RUNNING = 1 << 2;
        /// Transfer is done, image is being validated
        const VERIFYING = 1 << 3;
        /// Attempt concluded and awaits acknowledgement
        const REQUEST_FINISHED = 1 << 4;
        /// Only ever set together with `REQUEST_FINISHED`
        const REQUEST_SUCCEEDED = 1 << 5;
        /// Caller asked the worker to terminate
        const END_REQUESTED = 1 << 6;
        /// Worker terminated and released its thread
        const WORKER_ENDED = 1 << 7;
        /// Caller asked the in-flight attempt to cancel
        const ABORT_REQUESTED = 1 << 8;
    }
}

impl Flags {
    /// An attempt has been triggered and not yet finished
    pub const IN_FLIGHT: Self = Self::START_REQUESTED.union(Self::REQUEST_RUNNING);
}

/// Broadcast bit-set with blocking wait-for-any semantics
#[derive(Debug, Default)]
pub struct FlagRegister {
    bits: AtomicU32,
    park: Mutex<()>,
    wake: Condvar,
}

impl FlagRegister {
    /// Create a register with every flag cleared
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current flags without blocking
    pub fn snapshot(&self) -> Flags {
        Flags::from_bits_retain(self.bits.load(Ordering::Acquire))
    }

    /// Set `flags`, returning the bits as they were before
    pub fn set(&self, flags: Flags) -> Flags {
        let prev = Flags::from_bits_retain(self.bits.fetch_or(flags.bits(), Ordering::AcqRel));
        self.notify_if_changed(prev, prev | flags);
        prev
    }

    /// Clear `flags`, returning the bits as they were before
    ///
    /// Checking the returned value gives an edge-triggered test-and-clear.
    pub fn clear(&self, flags: Flags) -> Flags {
        let prev = Flags::from_bits_retain(self.bits.fetch_and(!flags.bits(), Ordering::AcqRel));
        self.notify_if_changed(prev, prev - flags);
        prev
    }

    /// Clear `clear` and set `set` in one atomic step
    pub fn transition(&self, clear: Flags, set: Flags) -> Flags {
        let prev = self
            .update(|cur| Some((cur - clear) | set))
            .unwrap_or_else(|cur| cur);
        self.notify_if_changed(prev, (prev - clear) | set);
        prev
    }

    /// Set `flags` only while at least one of `required_any` is set and none
    /// of `forbidden` is
    ///
    /// Returns the observed bits: `Ok` when the flags were set, `Err` when
    /// the precondition did not hold and nothing changed.
    pub fn set_if(&self, required_any: Flags, forbidden: Flags, flags: Flags) -> Result<Flags, Flags> {
        let result = self.update(|cur| {
            (cur.intersects(required_any) && !cur.intersects(forbidden)).then_some(cur | flags)
        });
        if let Ok(prev) = result {
            self.notify_if_changed(prev, prev | flags);
        }
        result
    }

    /// Block until any of `flags` is set or `timeout` elapses
    ///
    /// `None` waits forever. Returns the bits observed on exit; when
    /// `clear_on_exit` is true the matched bits are cleared before returning
    /// (the returned value still contains them).
    pub fn wait_any(&self, flags: Flags, clear_on_exit: bool, timeout: Option<Duration>) -> Flags {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock();

        loop {
            let cur = self.snapshot();
            if cur.intersects(flags) {
                if clear_on_exit {
                    let matched = cur & flags;
                    let prev = self.bits.fetch_and(!matched.bits(), Ordering::AcqRel);
                    drop(guard);
                    self.notify();
                    return Flags::from_bits_retain(prev);
                }
                return cur;
            }

            guard = match deadline {
                None => self.wake.wait(guard).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return cur;
                    }
                    self.wake
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn update(&self, mut f: impl FnMut(Flags) -> Option<Flags>) -> Result<Flags, Flags> {
        self.bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                f(Flags::from_bits_retain(cur)).map(|f| f.bits())
            })
            .map(Flags::from_bits_retain)
            .map_err(Flags::from_bits_retain)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.park.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_if_changed(&self, before: Flags, after: Flags) {
        if before != after {
            self.notify();
        }
    }

    // Taking the park lock before notifying closes the window between a
    // waiter's check and its call to `wait`.
    fn notify(&self) {
        drop(self.lock());
        self.wake.notify_all();
    }
}
