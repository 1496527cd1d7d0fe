//! Exponential backoff for busy-wait loops, after `crossbeam-utils`.

use core::cell::Cell;
use core::fmt;

/// The maximum exponent of spin count.
const SPIN_LIMIT: u32 = 6;

/// The exponent after which [`Backoff::snooze`] yields to the scheduler.
const YIELD_LIMIT: u32 = 10;

/// Performs exponential backoff in spin loops.
///
/// Each step takes roughly twice as long as the previous one. Once spinning
/// stops paying off, [`snooze`](Self::snooze) gives the time slice back to
/// the scheduler instead, which keeps the busy-wait primitives of the
/// portable backend usable when threads outnumber CPUs.
///
/// # Examples
///
/// ```
/// use dt_os::utils::Backoff;
/// use core::sync::atomic::{AtomicBool, Ordering};
///
/// let ready = AtomicBool::new(true);
/// let backoff = Backoff::new();
/// while !ready.load(Ordering::Acquire) {
///     backoff.snooze();
/// }
/// ```
pub struct Backoff {
    step: Cell<u32>,
}

impl Backoff {
    /// Creates a new `Backoff`.
    #[inline(always)]
    pub const fn new() -> Self {
        Self { step: Cell::new(0) }
    }

    /// Backs off in a lock-free loop.
    ///
    /// Use it when retrying an operation because another thread made
    /// progress.
    #[inline]
    pub fn spin(&self) {
        for _ in 0..1_u32 << self.step.get().min(SPIN_LIMIT) {
            core::hint::spin_loop();
        }

        if self.step.get() <= SPIN_LIMIT {
            self.step.set(self.step.get() + 1);
        }
    }

    /// Backs off in a blocking loop.
    ///
    /// Use it when waiting for another thread to make progress. Spins first,
    /// then yields the current thread to the scheduler.
    #[inline]
    pub fn snooze(&self) {
        if self.step.get() <= SPIN_LIMIT {
            for _ in 0..1_u32 << self.step.get() {
                core::hint::spin_loop();
            }
        } else {
            std::thread::yield_now();
        }

        if self.step.get() <= YIELD_LIMIT {
            self.step.set(self.step.get() + 1);
        }
    }

    /// Returns `true` once spinning no longer helps and the caller should
    /// block on something else.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step.get() > YIELD_LIMIT
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backoff")
            .field("step", &self.step)
            .field("is_completed", &self.is_completed())
            .finish()
    }
}

impl Default for Backoff {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}
