#![expect(unsafe_code, reason = "Calls into Win32.")]

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::{fmt, mem};

use windows_sys::Win32::System::Threading::{
    AcquireSRWLockExclusive, CRITICAL_SECTION, DeleteCriticalSection, EnterCriticalSection,
    InitializeCriticalSection, LeaveCriticalSection, ReleaseSRWLockExclusive, SRWLOCK,
    SRWLOCK_INIT, TryAcquireSRWLockExclusive, TryEnterCriticalSection,
};

use crate::backend::{RawMutex, RawRecursiveMutex, poll_until};
use crate::time::Deadline;
use crate::{SyncError, SyncResult};

// -----------------------------------------------------------------------------
// Mutex

/// An `SRWLOCK` used in exclusive mode only.
pub struct Mutex {
    inner: UnsafeCell<SRWLOCK>,
}

unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    #[inline]
    pub(super) fn raw(&self) -> *mut SRWLOCK {
        self.inner.get()
    }
}

unsafe impl RawMutex for Mutex {
    #[inline]
    fn init() -> SyncResult<Self> {
        Ok(Mutex {
            inner: UnsafeCell::new(SRWLOCK_INIT),
        })
    }

    #[inline]
    fn lock(&self) -> SyncResult {
        unsafe { AcquireSRWLockExclusive(self.raw()) };
        Ok(())
    }

    #[inline]
    fn try_lock(&self) -> SyncResult {
        if unsafe { TryAcquireSRWLockExclusive(self.raw()) } != 0 {
            Ok(())
        } else {
            Err(SyncError::Busy)
        }
    }

    fn timed_lock(&self, deadline: &Deadline) -> SyncResult {
        poll_until(deadline, || self.try_lock())
    }

    #[inline]
    unsafe fn unlock(&self) -> SyncResult {
        unsafe { ReleaseSRWLockExclusive(self.raw()) };
        Ok(())
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// RecursiveMutex

/// A `CRITICAL_SECTION`, recursive by nature.
pub struct RecursiveMutex {
    inner: Box<UnsafeCell<CRITICAL_SECTION>>,
}

unsafe impl Send for RecursiveMutex {}
unsafe impl Sync for RecursiveMutex {}

unsafe impl RawRecursiveMutex for RecursiveMutex {
    fn init() -> SyncResult<Self> {
        let inner: Box<UnsafeCell<CRITICAL_SECTION>> =
            Box::new(UnsafeCell::new(unsafe { mem::zeroed() }));
        unsafe { InitializeCriticalSection(inner.get()) };
        Ok(RecursiveMutex { inner })
    }

    #[inline]
    fn lock(&self) -> SyncResult {
        unsafe { EnterCriticalSection(self.inner.get()) };
        Ok(())
    }

    #[inline]
    fn try_lock(&self) -> SyncResult {
        if unsafe { TryEnterCriticalSection(self.inner.get()) } != 0 {
            Ok(())
        } else {
            Err(SyncError::Busy)
        }
    }

    #[inline]
    unsafe fn unlock(&self) -> SyncResult {
        unsafe { LeaveCriticalSection(self.inner.get()) };
        Ok(())
    }
}

impl Drop for RecursiveMutex {
    fn drop(&mut self) {
        unsafe { DeleteCriticalSection(self.inner.get()) };
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
    fn srw_mutex() {
        let m = Mutex::init().unwrap();
        m.lock().unwrap();
        assert_eq!(m.try_lock(), Err(SyncError::Busy));
        assert_eq!(
            m.timed_lock(&Deadline::after(Duration::from_millis(10))),
            Err(SyncError::TimedOut)
        );
        unsafe { m.unlock().unwrap() };
        m.try_lock().unwrap();
        unsafe { m.unlock().unwrap() };
    }

    #[test]
    fn critical_section_reenters() {
        let m = Arc::new(RecursiveMutex::init().unwrap());
        m.lock().unwrap();
        m.try_lock().unwrap();
        let other = m.clone();
        assert_eq!(thread::spawn(move || other.try_lock()).join().unwrap(), Err(SyncError::Busy));
        unsafe {
            m.unlock().unwrap();
            m.unlock().unwrap();
        }
    }
}
