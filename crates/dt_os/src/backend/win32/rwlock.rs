#![expect(unsafe_code, reason = "Calls into Win32.")]

use core::cell::UnsafeCell;
use core::fmt;

use windows_sys::Win32::System::Threading::{
    AcquireSRWLockExclusive, AcquireSRWLockShared, ReleaseSRWLockExclusive, ReleaseSRWLockShared,
    SRWLOCK, SRWLOCK_INIT, TryAcquireSRWLockExclusive, TryAcquireSRWLockShared,
};

use crate::backend::{RawRwLock, poll_until};
use crate::time::Deadline;
use crate::{SyncError, SyncResult};

/// An `SRWLOCK` in both modes.
///
/// The lock itself does not remember how it was acquired, so the caller
/// picks the matching release.
pub struct RwLock {
    inner: UnsafeCell<SRWLOCK>,
}

unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}

impl RwLock {
    #[inline]
    fn raw(&self) -> *mut SRWLOCK {
        self.inner.get()
    }
}

#[inline]
fn acquired(ok: u8) -> SyncResult {
    if ok != 0 { Ok(()) } else { Err(SyncError::Busy) }
}

unsafe impl RawRwLock for RwLock {
    #[inline]
    fn init() -> SyncResult<Self> {
        Ok(RwLock {
            inner: UnsafeCell::new(SRWLOCK_INIT),
        })
    }

    #[inline]
    fn read(&self) -> SyncResult {
        unsafe { AcquireSRWLockShared(self.raw()) };
        Ok(())
    }

    #[inline]
    fn try_read(&self) -> SyncResult {
        acquired(unsafe { TryAcquireSRWLockShared(self.raw()) })
    }

    fn timed_read(&self, deadline: &Deadline) -> SyncResult {
        poll_until(deadline, || self.try_read())
    }

    #[inline]
    fn write(&self) -> SyncResult {
        unsafe { AcquireSRWLockExclusive(self.raw()) };
        Ok(())
    }

    #[inline]
    fn try_write(&self) -> SyncResult {
        acquired(unsafe { TryAcquireSRWLockExclusive(self.raw()) })
    }

    fn timed_write(&self, deadline: &Deadline) -> SyncResult {
        poll_until(deadline, || self.try_write())
    }

    #[inline]
    unsafe fn unlock_read(&self) -> SyncResult {
        unsafe { ReleaseSRWLockShared(self.raw()) };
        Ok(())
    }

    #[inline]
    unsafe fn unlock_write(&self) -> SyncResult {
        unsafe { ReleaseSRWLockExclusive(self.raw()) };
        Ok(())
    }
}

impl fmt::Debug for RwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLock").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::RwLock;
    use crate::SyncError;
    use crate::backend::RawRwLock;

    #[test]
    fn releases_in_the_acquired_mode() {
        let l = RwLock::init().unwrap();
        l.read().unwrap();
        l.try_read().unwrap();
        assert_eq!(l.try_write(), Err(SyncError::Busy));
        unsafe {
            l.unlock_read().unwrap();
            l.unlock_read().unwrap();
        }
        l.write().unwrap();
        assert_eq!(l.try_read(), Err(SyncError::Busy));
        unsafe { l.unlock_write().unwrap() };
        l.try_write().unwrap();
        unsafe { l.unlock_write().unwrap() };
    }
}
