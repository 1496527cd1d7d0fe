#![expect(unsafe_code, reason = "Mutex requires unsafe code.")]

use core::{
    cell::UnsafeCell,
    fmt,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    panic::{RefUnwindSafe, UnwindSafe},
};

use super::NativeMutex;
use crate::backend::RawMutex;
use crate::time::Deadline;
use crate::{SyncError, SyncResult};

/// A mutual exclusion primitive protecting a value of type `T`.
///
/// Backed by the platform mutex of [`Native`](crate::backend::Native). Every
/// call reports the platform's answer as a [`SyncResult`] instead of
/// panicking, and the lock is held for exactly as long as the returned
/// [`MutexGuard`] lives.
///
/// There is no poisoning: a guard dropped during unwinding releases the lock
/// like any other.
///
/// # Examples
///
/// ```
/// use dt_os::SyncError;
/// use dt_os::sync::Mutex;
///
/// let mutex = Mutex::new(5).unwrap();
/// {
///     let mut guard = mutex.lock().unwrap();
///     *guard += 1;
///     assert_eq!(mutex.try_lock().err(), Some(SyncError::Busy));
/// }
/// assert_eq!(mutex.into_inner(), 6);
/// ```
pub struct Mutex<T: ?Sized> {
    raw: NativeMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}
impl<T: ?Sized> UnwindSafe for Mutex<T> {}
impl<T: ?Sized> RefUnwindSafe for Mutex<T> {}

/// An RAII implementation of a "scoped lock" of a [`Mutex`].
///
/// When this structure is dropped (falls out of scope), the lock is
/// released. [`MutexGuard::unlock`] does the same and reports the result.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized + 'a> {
    lock: &'a Mutex<T>,
    data: *mut T, // cache the pointer
}

// !Send is auto implemented
unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex (`init`).
    ///
    /// Fails if the platform cannot allocate the lock.
    #[inline]
    pub fn new(value: T) -> SyncResult<Self> {
        Ok(Mutex {
            raw: NativeMutex::init()?,
            data: UnsafeCell::new(value),
        })
    }

    /// Consumes the mutex and returns the protected value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    #[inline]
    fn guard(&self) -> MutexGuard<'_, T> {
        MutexGuard {
            lock: self,
            data: self.data.get(),
        }
    }

    /// Blocks the current thread until the lock is acquired.
    ///
    /// Locking a mutex the current thread already holds does not return.
    #[inline]
    pub fn lock(&self) -> SyncResult<MutexGuard<'_, T>> {
        self.raw.lock()?;
        Ok(self.guard())
    }

    /// Acquires the lock if it is free.
    ///
    /// Returns `Err(Busy)` without blocking otherwise.
    #[inline]
    pub fn try_lock(&self) -> SyncResult<MutexGuard<'_, T>> {
        self.raw.try_lock()?;
        Ok(self.guard())
    }

    /// Blocks until the lock is acquired or `deadline` passes.
    ///
    /// Returns `Err(TimedOut)` in the latter case. A deadline in the past
    /// still makes one attempt.
    #[inline]
    pub fn timed_lock(&self, deadline: &Deadline) -> SyncResult<MutexGuard<'_, T>> {
        self.raw.timed_lock(deadline)?;
        Ok(self.guard())
    }

    /// Returns a mutable reference to the protected value.
    ///
    /// No locking is needed since the borrow is exclusive.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    pub(crate) fn raw(&self) -> &NativeMutex {
        &self.raw
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Ok(guard) => d.field("data", &&*guard),
            Err(SyncError::Busy) => d.field("data", &format_args!("<locked>")),
            Err(_) => d.field("data", &format_args!("<unavailable>")),
        };
        d.finish_non_exhaustive()
    }
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    /// Releases the lock and reports the platform's answer.
    pub fn unlock(self) -> SyncResult {
        let this = ManuallyDrop::new(self);
        // SAFETY: the guard proves the lock is held by this thread.
        unsafe { this.lock.raw.unlock() }
    }

    #[inline]
    pub(crate) fn mutex(&self) -> &'a Mutex<T> {
        self.lock
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.data }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.data }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.lock.raw.unlock() } {
            log::error!("failed to unlock a mutex: {e}");
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::sync::{Arc, mpsc::channel};
    use std::thread;

    use super::Mutex;
    use crate::SyncError;
    use crate::time::Deadline;

    #[test]
    fn four_threads_increment() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 1000;

        let counter = Arc::new(Mutex::new(0usize).unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        *counter.lock().unwrap() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), THREADS * ROUNDS);
    }

    #[test]
    fn try_lock_while_held_elsewhere() {
        let m = Arc::new(Mutex::new(()).unwrap());
        let (locked_tx, locked_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();

        let holder = {
            let m = m.clone();
            thread::spawn(move || {
                let _g = m.lock().unwrap();
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };

        locked_rx.recv().unwrap();
        assert_eq!(m.try_lock().err(), Some(SyncError::Busy));
        let start = std::time::Instant::now();
        assert_eq!(
            m.timed_lock(&Deadline::after(Duration::from_millis(50))).err(),
            Some(SyncError::TimedOut)
        );
        assert!(start.elapsed() >= Duration::from_millis(40));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        m.try_lock().unwrap().unlock().unwrap();
    }

    #[test]
    fn expired_deadline_does_not_block() {
        let m = Arc::new(Mutex::new(()).unwrap());
        let _g = m.lock().unwrap();
        let other = m.clone();
        let elapsed = thread::spawn(move || {
            let start = std::time::Instant::now();
            let res = other.timed_lock(&Deadline::before(Duration::from_millis(50)));
            assert_eq!(res.err(), Some(SyncError::TimedOut));
            start.elapsed()
        })
        .join()
        .unwrap();
        assert!(elapsed < Duration::from_millis(5), "{elapsed:?}");
    }

    #[test]
    fn guard_released_on_unwind() {
        let m = Mutex::new(1).unwrap();
        let res = crate::utils::tests::test_unwind_panic(|| {
            let _g = m.lock().unwrap();
            panic!("boom");
        });
        assert!(res.is_err());
        assert_eq!(*m.try_lock().unwrap(), 1);
    }

    #[test]
    fn get_mut_and_debug() {
        let mut m = Mutex::new(vec![1, 2]).unwrap();
        m.get_mut().push(3);
        assert_eq!(format!("{m:?}"), "Mutex { data: [1, 2, 3], .. }");
        let g = m.lock().unwrap();
        assert_eq!(format!("{m:?}"), "Mutex { data: <locked>, .. }");
        drop(g);
    }
}
