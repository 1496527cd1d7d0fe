use core::fmt;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::sync::atomic::{
    AtomicU8,
    Ordering::{Acquire, Relaxed, Release},
};
use crate::{SyncError, SyncResult};

const INCOMPLETE: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETE: u8 = 2;
const POISONED: u8 = 3; // routine unwound

/// Where threads wait for a running routine of any [`OnceFlag`].
///
/// Shared by all flags: completions are rare, and waiters re-check their
/// own flag after every wakeup.
static PARKING: (Mutex<()>, Condvar) = (Mutex::new(()), Condvar::new());

/// Publishes the final state and wakes waiters, even during unwinding.
struct CompletionGuard<'a> {
    state: &'a AtomicU8,
    set_state_on_drop_to: u8,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if self.set_state_on_drop_to == POISONED {
            log::warn!("a once routine unwound, the flag is poisoned");
        }
        self.state.store(self.set_state_on_drop_to, Release);
        // Taking the lock orders the store before any waiter's next check.
        let _parked = PARKING.0.lock().unwrap_or_else(PoisonError::into_inner);
        PARKING.1.notify_all();
    }
}

/// Runs a routine exactly once across every caller sharing the flag.
///
/// The first caller runs the routine; concurrent callers block until it
/// finishes, and later callers return at once. Every caller that gets
/// `Ok(())` observes the routine's writes.
///
/// If the routine unwinds the flag is poisoned: the panic continues in the
/// calling thread and every other call reports `Err(Error)`.
///
/// # Examples
///
/// ```
/// use dt_os::sync::OnceFlag;
///
/// static INIT: OnceFlag = OnceFlag::new();
///
/// let mut runs = 0;
/// for _ in 0..3 {
///     INIT.call_once(|| runs += 1).unwrap();
/// }
/// assert_eq!(runs, 1);
/// assert!(INIT.is_completed());
/// ```
pub struct OnceFlag {
    state: AtomicU8,
}

impl OnceFlag {
    /// Creates a flag whose routine has not run yet.
    #[allow(
        clippy::new_without_default,
        reason = "a flag is meant to be a `static`"
    )]
    #[inline]
    #[must_use]
    pub const fn new() -> OnceFlag {
        OnceFlag {
            state: AtomicU8::new(INCOMPLETE),
        }
    }

    /// Returns `true` once a routine has completed without unwinding.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state.load(Acquire) == COMPLETE
    }

    /// Returns `true` if a routine unwound.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.state.load(Acquire) == POISONED
    }

    /// Runs `f` if no routine has run on this flag yet, otherwise waits for
    /// the one that did.
    ///
    /// Returns `Err(Error)` if the flag is poisoned.
    pub fn call_once<F: FnOnce()>(&self, f: F) -> SyncResult {
        // Fast path check
        if self.is_completed() {
            return Ok(());
        }

        let mut f = Some(f);
        let mut state = self.state.load(Acquire);
        loop {
            match state {
                COMPLETE => return Ok(()),
                POISONED => return Err(SyncError::Error),
                INCOMPLETE => {
                    if let Err(now) =
                        self.state
                            .compare_exchange_weak(INCOMPLETE, RUNNING, Acquire, Acquire)
                    {
                        state = now;
                        continue;
                    }

                    let mut completion = CompletionGuard {
                        state: &self.state,
                        set_state_on_drop_to: POISONED,
                    };
                    if let Some(f) = f.take() {
                        f();
                    }
                    completion.set_state_on_drop_to = COMPLETE;
                    return Ok(());
                }
                _ => {
                    state = self.park();
                }
            }
        }
    }

    /// Blocks while the routine runs and returns the state after it.
    fn park(&self) -> u8 {
        let mut parked = PARKING.0.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let state = self.state.load(Acquire);
            if state != RUNNING {
                return state;
            }
            parked = PARKING
                .1
                .wait(parked)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl fmt::Debug for OnceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Relaxed) {
            INCOMPLETE => "incomplete",
            RUNNING => "running",
            COMPLETE => "complete",
            _ => "poisoned",
        };
        f.debug_struct("OnceFlag").field("state", &state).finish()
    }
}
