#![expect(unsafe_code, reason = "Calls into pthreads.")]

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::{fmt, mem, ptr};

use super::{Mutex, check, timespec};
use crate::SyncResult;
use crate::backend::RawCondvar;
use crate::time::Deadline;

/// A `pthread_cond_t` on the realtime clock.
pub struct Condvar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

unsafe impl RawCondvar<Mutex> for Condvar {
    fn init() -> SyncResult<Self> {
        let inner: Box<UnsafeCell<libc::pthread_cond_t>> =
            Box::new(UnsafeCell::new(unsafe { mem::zeroed() }));
        check(unsafe { libc::pthread_cond_init(inner.get(), ptr::null()) })?;
        Ok(Condvar { inner })
    }

    #[inline]
    fn signal(&self) -> SyncResult {
        check(unsafe { libc::pthread_cond_signal(self.inner.get()) })
    }

    #[inline]
    fn broadcast(&self) -> SyncResult {
        check(unsafe { libc::pthread_cond_broadcast(self.inner.get()) })
    }

    #[inline]
    unsafe fn wait(&self, mutex: &Mutex) -> SyncResult {
        check(unsafe { libc::pthread_cond_wait(self.inner.get(), mutex.raw()) })
    }

    unsafe fn timed_wait(&self, mutex: &Mutex, deadline: &Deadline) -> SyncResult {
        let ts = timespec(deadline);
        check(unsafe { libc::pthread_cond_timedwait(self.inner.get(), mutex.raw(), &ts) })
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_cond_destroy(self.inner.get());
        }
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}
