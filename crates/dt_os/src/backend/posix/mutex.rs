#![expect(unsafe_code, reason = "Calls into pthreads.")]

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::mem::{self, ManuallyDrop};
use core::{fmt, ptr};

use super::check;
use crate::SyncResult;
use crate::backend::{RawMutex, RawRecursiveMutex};
use crate::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use crate::time::Deadline;

/// Allocates and initializes a mutex of the given pthread kind.
fn new_raw(kind: Option<libc::c_int>) -> SyncResult<Box<UnsafeCell<libc::pthread_mutex_t>>> {
    let raw: Box<UnsafeCell<libc::pthread_mutex_t>> =
        Box::new(UnsafeCell::new(unsafe { mem::zeroed() }));

    let Some(kind) = kind else {
        check(unsafe { libc::pthread_mutex_init(raw.get(), ptr::null()) })?;
        return Ok(raw);
    };

    let mut attr: libc::pthread_mutexattr_t = unsafe { mem::zeroed() };
    check(unsafe { libc::pthread_mutexattr_init(&mut attr) })?;
    let res = check(unsafe { libc::pthread_mutexattr_settype(&mut attr, kind) })
        .and_then(|()| check(unsafe { libc::pthread_mutex_init(raw.get(), &attr) }));
    unsafe {
        libc::pthread_mutexattr_destroy(&mut attr);
    }
    res.map(|()| raw)
}

// -----------------------------------------------------------------------------
// Mutex

/// A `pthread_mutex_t` of the default kind.
pub struct Mutex {
    inner: ManuallyDrop<Box<UnsafeCell<libc::pthread_mutex_t>>>,
}

unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    #[inline]
    pub(super) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

unsafe impl RawMutex for Mutex {
    fn init() -> SyncResult<Self> {
        Ok(Mutex {
            inner: ManuallyDrop::new(new_raw(None)?),
        })
    }

    #[inline]
    fn lock(&self) -> SyncResult {
        check(unsafe { libc::pthread_mutex_lock(self.raw()) })
    }

    #[inline]
    fn try_lock(&self) -> SyncResult {
        check(unsafe { libc::pthread_mutex_trylock(self.raw()) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn timed_lock(&self, deadline: &Deadline) -> SyncResult {
        let ts = super::timespec(deadline);
        check(unsafe { libc::pthread_mutex_timedlock(self.raw(), &ts) })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn timed_lock(&self, deadline: &Deadline) -> SyncResult {
        crate::backend::poll_until(deadline, || self.try_lock())
    }

    #[inline]
    unsafe fn unlock(&self) -> SyncResult {
        check(unsafe { libc::pthread_mutex_unlock(self.raw()) })
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        // A forgotten guard leaves the mutex locked. Destroying a locked
        // mutex is undefined, so leak it instead.
        if unsafe { libc::pthread_mutex_trylock(self.raw()) } != 0 {
            log::warn!("dropping a locked mutex, its memory is leaked");
            return;
        }
        unsafe {
            libc::pthread_mutex_unlock(self.raw());
            libc::pthread_mutex_destroy(self.raw());
            ManuallyDrop::drop(&mut self.inner);
        }
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// RecursiveMutex

/// A `pthread_mutex_t` of kind `PTHREAD_MUTEX_RECURSIVE`.
pub struct RecursiveMutex {
    inner: ManuallyDrop<Box<UnsafeCell<libc::pthread_mutex_t>>>,
    // Outstanding acquisitions across all threads. The owner's own
    // `trylock` succeeds, so it cannot tell a held mutex on drop.
    holds: AtomicUsize,
}

unsafe impl Send for RecursiveMutex {}
unsafe impl Sync for RecursiveMutex {}

unsafe impl RawRecursiveMutex for RecursiveMutex {
    fn init() -> SyncResult<Self> {
        Ok(RecursiveMutex {
            inner: ManuallyDrop::new(new_raw(Some(libc::PTHREAD_MUTEX_RECURSIVE))?),
            holds: AtomicUsize::new(0),
        })
    }

    #[inline]
    fn lock(&self) -> SyncResult {
        check(unsafe { libc::pthread_mutex_lock(self.inner.get()) })?;
        self.holds.fetch_add(1, Relaxed);
        Ok(())
    }

    #[inline]
    fn try_lock(&self) -> SyncResult {
        check(unsafe { libc::pthread_mutex_trylock(self.inner.get()) })?;
        self.holds.fetch_add(1, Relaxed);
        Ok(())
    }

    #[inline]
    unsafe fn unlock(&self) -> SyncResult {
        check(unsafe { libc::pthread_mutex_unlock(self.inner.get()) })?;
        self.holds.fetch_sub(1, Relaxed);
        Ok(())
    }
}

impl Drop for RecursiveMutex {
    fn drop(&mut self) {
        if *self.holds.get_mut() != 0 {
            log::warn!("dropping a locked recursive mutex, its memory is leaked");
            return;
        }
        unsafe {
            libc::pthread_mutex_destroy(self.inner.get());
            ManuallyDrop::drop(&mut self.inner);
        }
    }
}

impl fmt::Debug for RecursiveMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveMutex").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::sync::Arc;
    use std::thread;

    use super::{Mutex, RecursiveMutex};
    use crate::SyncError;
    use crate::backend::{RawMutex, RawRecursiveMutex};
    use crate::time::Deadline;

    #[test]
    fn lock_try_lock_timed_lock() {
        let m = Arc::new(Mutex::init().unwrap());
        m.lock().unwrap();
        assert_eq!(m.try_lock(), Err(SyncError::Busy));

        let other = m.clone();
        let res = thread::spawn(move || {
            other.timed_lock(&Deadline::after(Duration::from_millis(30)))
        })
        .join()
        .unwrap();
        assert_eq!(res, Err(SyncError::TimedOut));

        unsafe { m.unlock().unwrap() };
        m.timed_lock(&Deadline::after(Duration::from_secs(1))).unwrap();
        unsafe { m.unlock().unwrap() };
    }

    #[test]
    fn recursive_balances() {
        let m = Arc::new(RecursiveMutex::init().unwrap());
        m.lock().unwrap();
        m.lock().unwrap();
        unsafe { m.unlock().unwrap() };

        let other = m.clone();
        let res = thread::spawn(move || other.try_lock()).join().unwrap();
        assert_eq!(res, Err(SyncError::Busy));

        unsafe { m.unlock().unwrap() };
        let other = m.clone();
        thread::spawn(move || {
            other.try_lock().unwrap();
            unsafe { other.unlock().unwrap() };
        })
        .join()
        .unwrap();
    }

    #[test]
    fn dropping_held_mutexes_leaks() {
        let m = Mutex::init().unwrap();
        m.lock().unwrap();
        drop(m);

        let r = RecursiveMutex::init().unwrap();
        r.lock().unwrap();
        r.lock().unwrap();
        unsafe { r.unlock().unwrap() };
        drop(r);

        let r = RecursiveMutex::init().unwrap();
        r.lock().unwrap();
        unsafe { r.unlock().unwrap() };
        drop(r);
    }
}
