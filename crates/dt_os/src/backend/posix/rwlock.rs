#![expect(unsafe_code, reason = "Calls into pthreads.")]

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::mem::{self, ManuallyDrop};
use core::fmt;

use super::check;
use crate::SyncResult;
use crate::backend::RawRwLock;
use crate::time::Deadline;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
unsafe extern "C" {
    fn pthread_rwlockattr_init(attr: *mut libc::pthread_rwlockattr_t) -> libc::c_int;
    fn pthread_rwlockattr_destroy(attr: *mut libc::pthread_rwlockattr_t) -> libc::c_int;
    fn pthread_rwlockattr_setkind_np(
        attr: *mut libc::pthread_rwlockattr_t,
        pref: libc::c_int,
    ) -> libc::c_int;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe extern "C" {
    fn pthread_rwlock_timedrdlock(
        lock: *mut libc::pthread_rwlock_t,
        abstime: *const libc::timespec,
    ) -> libc::c_int;
    fn pthread_rwlock_timedwrlock(
        lock: *mut libc::pthread_rwlock_t,
        abstime: *const libc::timespec,
    ) -> libc::c_int;
}

/// `PTHREAD_RWLOCK_PREFER_WRITER_NONRECURSIVE_NP`.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
const PREFER_WRITER_NONRECURSIVE: libc::c_int = 2;

/// A `pthread_rwlock_t`.
///
/// glibc prefers readers by default; the writer-preferring kind is requested
/// there. Other C libraries keep their own policy.
pub struct RwLock {
    inner: ManuallyDrop<Box<UnsafeCell<libc::pthread_rwlock_t>>>,
}

unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}

impl RwLock {
    #[inline]
    fn raw(&self) -> *mut libc::pthread_rwlock_t {
        self.inner.get()
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn init_raw(raw: *mut libc::pthread_rwlock_t) -> SyncResult {
        let mut attr: libc::pthread_rwlockattr_t = unsafe { mem::zeroed() };
        check(unsafe { pthread_rwlockattr_init(&mut attr) })?;
        let res = check(unsafe { pthread_rwlockattr_setkind_np(&mut attr, PREFER_WRITER_NONRECURSIVE) })
            .and_then(|()| check(unsafe { libc::pthread_rwlock_init(raw, &attr) }));
        unsafe {
            pthread_rwlockattr_destroy(&mut attr);
        }
        res
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn init_raw(raw: *mut libc::pthread_rwlock_t) -> SyncResult {
        check(unsafe { libc::pthread_rwlock_init(raw, core::ptr::null()) })
    }

    #[inline]
    fn unlock(&self) -> SyncResult {
        check(unsafe { libc::pthread_rwlock_unlock(self.raw()) })
    }
}

unsafe impl RawRwLock for RwLock {
    fn init() -> SyncResult<Self> {
        let inner: Box<UnsafeCell<libc::pthread_rwlock_t>> =
            Box::new(UnsafeCell::new(unsafe { mem::zeroed() }));
        RwLock::init_raw(inner.get())?;
        Ok(RwLock {
            inner: ManuallyDrop::new(inner),
        })
    }

    #[inline]
    fn read(&self) -> SyncResult {
        check(unsafe { libc::pthread_rwlock_rdlock(self.raw()) })
    }

    #[inline]
    fn try_read(&self) -> SyncResult {
        check(unsafe { libc::pthread_rwlock_tryrdlock(self.raw()) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn timed_read(&self, deadline: &Deadline) -> SyncResult {
        let ts = super::timespec(deadline);
        check(unsafe { pthread_rwlock_timedrdlock(self.raw(), &ts) })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn timed_read(&self, deadline: &Deadline) -> SyncResult {
        crate::backend::poll_until(deadline, || self.try_read())
    }

    #[inline]
    fn write(&self) -> SyncResult {
        check(unsafe { libc::pthread_rwlock_wrlock(self.raw()) })
    }

    #[inline]
    fn try_write(&self) -> SyncResult {
        check(unsafe { libc::pthread_rwlock_trywrlock(self.raw()) })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn timed_write(&self, deadline: &Deadline) -> SyncResult {
        let ts = super::timespec(deadline);
        check(unsafe { pthread_rwlock_timedwrlock(self.raw(), &ts) })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn timed_write(&self, deadline: &Deadline) -> SyncResult {
        crate::backend::poll_until(deadline, || self.try_write())
    }

    #[inline]
    unsafe fn unlock_read(&self) -> SyncResult {
        self.unlock()
    }

    #[inline]
    unsafe fn unlock_write(&self) -> SyncResult {
        self.unlock()
    }
}

impl Drop for RwLock {
    fn drop(&mut self) {
        // A forgotten guard leaves the lock held in some mode. Destroying it
        // then is undefined, so leak it instead.
        if unsafe { libc::pthread_rwlock_trywrlock(self.raw()) } != 0 {
            log::warn!("dropping a locked rwlock, its memory is leaked");
            return;
        }
        unsafe {
            libc::pthread_rwlock_unlock(self.raw());
            libc::pthread_rwlock_destroy(self.raw());
            ManuallyDrop::drop(&mut self.inner);
        }
    }
}

impl fmt::Debug for RwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLock").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::sync::Arc;
    use std::thread;

    use super::RwLock;
    use crate::SyncError;
    use crate::backend::RawRwLock;
    use crate::time::Deadline;

    #[test]
    fn shared_then_exclusive() {
        let l = Arc::new(RwLock::init().unwrap());
        l.read().unwrap();
        l.try_read().unwrap();

        let other = l.clone();
        let res = thread::spawn(move || {
            (
                other.try_write(),
                other.timed_write(&Deadline::after(Duration::from_millis(20))),
            )
        })
        .join()
        .unwrap();
        assert_eq!(res, (Err(SyncError::Busy), Err(SyncError::TimedOut)));

        unsafe {
            l.unlock_read().unwrap();
            l.unlock_read().unwrap();
        }
        l.timed_write(&Deadline::after(Duration::from_secs(1))).unwrap();

        let other = l.clone();
        let res = thread::spawn(move || other.try_read()).join().unwrap();
        assert_eq!(res, Err(SyncError::Busy));
        unsafe { l.unlock_write().unwrap() };
    }

    #[test]
    fn dropping_held_lock_leaks() {
        let l = RwLock::init().unwrap();
        l.read().unwrap();
        drop(l);

        let l = RwLock::init().unwrap();
        l.write().unwrap();
        drop(l);

        let l = RwLock::init().unwrap();
        l.read().unwrap();
        unsafe { l.unlock_read().unwrap() };
        drop(l);
    }
}
