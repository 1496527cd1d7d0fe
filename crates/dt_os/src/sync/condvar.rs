#![expect(unsafe_code, reason = "Waiting releases a mutex held by a guard.")]

use core::fmt;

use super::{MutexGuard, NativeCondvar};
use crate::backend::RawCondvar;
use crate::time::Deadline;
use crate::{SyncError, SyncResult};

/// Whether a timed wait returned because its deadline passed.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct WaitTimeoutResult(bool);

impl WaitTimeoutResult {
    /// Returns `true` if the wait is known to have timed out.
    #[must_use]
    #[inline]
    pub fn timed_out(&self) -> bool {
        self.0
    }
}

/// A condition variable.
///
/// A thread holding a [`MutexGuard`] can atomically release the mutex and
/// sleep until another thread calls [`signal`](Self::signal) or
/// [`broadcast`](Self::broadcast). The mutex is locked again before every
/// wait returns, including timed waits whose deadline passed.
///
/// Wakeups may be spurious, so waits belong in a loop that re-checks the
/// condition; [`wait_while`](Self::wait_while) is that loop.
///
/// The same condition variable may be used with different mutexes, one at a
/// time.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dt_os::sync::{Condvar, Mutex};
///
/// let pair = Arc::new((Mutex::new(false).unwrap(), Condvar::new().unwrap()));
/// let pair2 = pair.clone();
///
/// let t = std::thread::spawn(move || {
///     let (lock, cvar) = &*pair2;
///     *lock.lock().unwrap() = true;
///     cvar.signal().unwrap();
/// });
///
/// let (lock, cvar) = &*pair;
/// let started = cvar.wait_while(lock.lock().unwrap(), |started| !*started).unwrap();
/// assert!(*started);
/// # drop(started);
/// # t.join().unwrap();
/// ```
pub struct Condvar {
    raw: NativeCondvar,
}

impl Condvar {
    /// Creates a condition variable with no waiters.
    #[inline]
    pub fn new() -> SyncResult<Self> {
        Ok(Condvar {
            raw: NativeCondvar::init()?,
        })
    }

    /// Wakes at least one thread blocked on this condition variable.
    #[inline]
    pub fn signal(&self) -> SyncResult {
        self.raw.signal()
    }

    /// Wakes every thread blocked on this condition variable.
    #[inline]
    pub fn broadcast(&self) -> SyncResult {
        self.raw.broadcast()
    }

    /// Releases the mutex of `guard`, blocks until woken, then re-acquires
    /// the mutex.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> SyncResult<MutexGuard<'a, T>> {
        // SAFETY: the guard proves the mutex is held by this thread.
        unsafe { self.raw.wait(guard.mutex().raw())? };
        Ok(guard)
    }

    /// Like [`wait`](Self::wait), but gives up once `deadline` passes.
    ///
    /// The guard comes back in both cases; the [`WaitTimeoutResult`] tells
    /// them apart.
    pub fn timed_wait<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
        deadline: &Deadline,
    ) -> SyncResult<(MutexGuard<'a, T>, WaitTimeoutResult)> {
        // SAFETY: as in `wait`.
        match unsafe { self.raw.timed_wait(guard.mutex().raw(), deadline) } {
            Ok(()) => Ok((guard, WaitTimeoutResult(false))),
            Err(SyncError::TimedOut) => Ok((guard, WaitTimeoutResult(true))),
            Err(e) => Err(e),
        }
    }

    /// Waits while `condition` returns `true`.
    ///
    /// `condition` is checked before the first wait and after every wakeup,
    /// always with the mutex held.
    pub fn wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> SyncResult<MutexGuard<'a, T>>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(guard)?;
        }
        Ok(guard)
    }

    /// Waits while `condition` returns `true`, until `deadline` at most.
    ///
    /// Reports a timeout only if the condition still holds when the deadline
    /// passes.
    pub fn timed_wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        deadline: &Deadline,
        mut condition: F,
    ) -> SyncResult<(MutexGuard<'a, T>, WaitTimeoutResult)>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        loop {
            if !condition(&mut *guard) {
                return Ok((guard, WaitTimeoutResult(false)));
            }
            let (g, res) = self.timed_wait(guard, deadline)?;
            guard = g;
            if res.timed_out() {
                let timed_out = condition(&mut *guard);
                return Ok((guard, WaitTimeoutResult(timed_out)));
            }
        }
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::sync::{Arc, mpsc::channel};
    use std::thread;

    use super::Condvar;
    use crate::sync::Mutex;
    use crate::time::Deadline;

    #[test]
    fn signal_wakes_waiter() {
        let pair = Arc::new((Mutex::new(false).unwrap(), Condvar::new().unwrap()));
        let (ready_tx, ready_rx) = channel();

        let waiter = {
            let pair = pair.clone();
            thread::spawn(move || {
                let (m, cv) = &*pair;
                let mut g = m.lock().unwrap();
                ready_tx.send(()).unwrap();
                while !*g {
                    g = cv.wait(g).unwrap();
                }
            })
        };

        ready_rx.recv().unwrap();
        *pair.0.lock().unwrap() = true;
        pair.1.signal().unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn timed_wait_expires_with_the_lock_held() {
        let m = Mutex::new(0).unwrap();
        let cv = Condvar::new().unwrap();

        let start = std::time::Instant::now();
        let g = m.lock().unwrap();
        let (g, res) = cv
            .timed_wait_while(g, &Deadline::after(Duration::from_millis(50)), |_| true)
            .unwrap();
        assert!(res.timed_out());
        assert!(start.elapsed() >= Duration::from_millis(45));
        assert_eq!(*g, 0);
        assert!(m.try_lock().is_err());
        drop(g);

        let g = m.lock().unwrap();
        let (_g, res) = cv
            .timed_wait(g, &Deadline::before(Duration::from_secs(1)))
            .unwrap();
        assert!(res.timed_out());
    }

    #[test]
    fn broadcast_wakes_everyone() {
        const N: usize = 6;
        let pair = Arc::new((Mutex::new((false, 0usize)).unwrap(), Condvar::new().unwrap()));
        let (done_tx, done_rx) = channel();

        for _ in 0..N {
            let pair = pair.clone();
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                let (m, cv) = &*pair;
                let mut g = m.lock().unwrap();
                g.1 += 1;
                let g = cv.wait_while(g, |(open, _)| !*open).unwrap();
                drop(g);
                done_tx.send(()).unwrap();
            });
        }

        // A waiter counts itself and parks under the same lock, so once all
        // six are counted none of them can miss the broadcast.
        let (m, cv) = &*pair;
        loop {
            let mut g = m.lock().unwrap();
            if g.1 == N {
                g.0 = true;
                cv.broadcast().unwrap();
                break;
            }
            drop(g);
            thread::sleep(Duration::from_millis(1));
        }
        for _ in 0..N {
            done_rx.recv().unwrap();
        }
    }
}
