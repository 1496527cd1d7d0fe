#![expect(unsafe_code, reason = "Raw primitives require unsafe code.")]

use core::fmt;

use super::Mutex;
use crate::backend::{RawCondvar, RawMutex};
use crate::sync::atomic::AtomicU32;
use crate::sync::atomic::Ordering::Relaxed;
use crate::time::Deadline;
use crate::utils::Backoff;
use crate::{SyncError, SyncResult};

/// A condition variable built on a notification counter.
///
/// Waiters remember the counter before releasing the mutex and busy-wait
/// until it changes. Every notification bumps the counter, so `signal`
/// behaves like `broadcast` and may wake more than one waiter.
pub struct Condvar {
    state: AtomicU32,
}

impl Condvar {
    /// Creates a condition variable with no waiters.
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Waits for a notification after `seen`, or for `deadline`.
    ///
    /// Returns `false` if the deadline passed first.
    fn wait_for_change(&self, seen: u32, deadline: Option<&Deadline>) -> bool {
        let backoff = Backoff::new();
        loop {
            if self.state.load(Relaxed) != seen {
                return true;
            }
            if backoff.is_completed()
                && let Some(deadline) = deadline
                && deadline.has_passed()
            {
                return false;
            }
            backoff.snooze();
        }
    }

    unsafe fn wait_optional_deadline(
        &self,
        mutex: &Mutex,
        deadline: Option<&Deadline>,
    ) -> SyncResult {
        if deadline.is_some_and(Deadline::has_passed) {
            return Err(SyncError::TimedOut);
        }

        // Examine the notification counter _before_ we unlock the mutex.
        let seen = self.state.load(Relaxed);
        // SAFETY: the caller holds `mutex`.
        unsafe { mutex.unlock()? };

        let woken = self.wait_for_change(seen, deadline);

        mutex.lock()?;
        if woken { Ok(()) } else { Err(SyncError::TimedOut) }
    }
}

unsafe impl RawCondvar<Mutex> for Condvar {
    #[inline]
    fn init() -> SyncResult<Self> {
        Ok(Self::new())
    }

    #[inline]
    fn signal(&self) -> SyncResult {
        self.state.fetch_add(1, Relaxed);
        Ok(())
    }

    #[inline]
    fn broadcast(&self) -> SyncResult {
        self.state.fetch_add(1, Relaxed);
        Ok(())
    }

    #[inline]
    unsafe fn wait(&self, mutex: &Mutex) -> SyncResult {
        unsafe { self.wait_optional_deadline(mutex, None) }
    }

    #[inline]
    unsafe fn timed_wait(&self, mutex: &Mutex, deadline: &Deadline) -> SyncResult {
        unsafe { self.wait_optional_deadline(mutex, Some(deadline)) }
    }
}

impl Default for Condvar {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use core::cell::UnsafeCell;
    use std::sync::{Arc, mpsc::channel};
    use std::thread;
    use std::time::Duration;

    use super::Condvar;
    use crate::SyncError;
    use crate::backend::portable::Mutex;
    use crate::backend::{RawCondvar, RawMutex};
    use crate::time::Deadline;

    struct Flag {
        lock: Mutex,
        cond: Condvar,
        set: UnsafeCell<bool>,
    }

    unsafe impl Sync for Flag {}

    impl Flag {
        fn new() -> Self {
            Flag {
                lock: Mutex::new(),
                cond: Condvar::new(),
                set: UnsafeCell::new(false),
            }
        }
    }

    #[test]
    fn timed_wait_times_out_and_relocks() {
        let m = Mutex::new();
        let cv = Condvar::new();
        m.lock().unwrap();
        let res = unsafe { cv.timed_wait(&m, &Deadline::after(Duration::from_millis(20))) };
        assert_eq!(res, Err(SyncError::TimedOut));
        assert!(m.is_locked());
        unsafe { m.unlock().unwrap() };
    }

    #[test]
    fn signal_wakes_waiter() {
        let flag = Arc::new(Flag::new());
        let (ready_tx, ready_rx) = channel();

        let waiter = {
            let flag = flag.clone();
            thread::spawn(move || {
                flag.lock.lock().unwrap();
                ready_tx.send(()).unwrap();
                while !unsafe { *flag.set.get() } {
                    unsafe { flag.cond.wait(&flag.lock).unwrap() };
                }
                unsafe { flag.lock.unlock().unwrap() };
            })
        };

        ready_rx.recv().unwrap();
        flag.lock.lock().unwrap();
        unsafe { *flag.set.get() = true };
        flag.cond.signal().unwrap();
        unsafe { flag.lock.unlock().unwrap() };
        waiter.join().unwrap();
    }

    #[test]
    fn broadcast_wakes_everyone() {
        const N: usize = 6;
        let flag = Arc::new(Flag::new());
        let (ready_tx, ready_rx) = channel();

        let waiters: Vec<_> = (0..N)
            .map(|_| {
                let flag = flag.clone();
                let ready_tx = ready_tx.clone();
                thread::spawn(move || {
                    flag.lock.lock().unwrap();
                    ready_tx.send(()).unwrap();
                    while !unsafe { *flag.set.get() } {
                        unsafe { flag.cond.wait(&flag.lock).unwrap() };
                    }
                    unsafe { flag.lock.unlock().unwrap() };
                })
            })
            .collect();

        for _ in 0..N {
            ready_rx.recv().unwrap();
        }
        flag.lock.lock().unwrap();
        unsafe { *flag.set.get() = true };
        flag.cond.broadcast().unwrap();
        unsafe { flag.lock.unlock().unwrap() };

        for w in waiters {
            w.join().unwrap();
        }
    }
}
