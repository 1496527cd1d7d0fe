#![expect(unsafe_code, reason = "Calls into Win32.")]

use core::cell::UnsafeCell;
use core::fmt;

use windows_sys::Win32::System::Threading::{
    CONDITION_VARIABLE, CONDITION_VARIABLE_INIT, INFINITE, SleepConditionVariableSRW,
    WakeAllConditionVariable, WakeConditionVariable,
};

use super::{Mutex, last_error, millis_until};
use crate::backend::RawCondvar;
use crate::time::Deadline;
use crate::{SyncError, SyncResult};

/// A `CONDITION_VARIABLE` paired with an exclusive `SRWLOCK`.
pub struct Condvar {
    inner: UnsafeCell<CONDITION_VARIABLE>,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Condvar {
    unsafe fn sleep(&self, mutex: &Mutex, ms: u32) -> SyncResult {
        if unsafe { SleepConditionVariableSRW(self.inner.get(), mutex.raw(), ms, 0) } != 0 {
            Ok(())
        } else {
            Err(last_error())
        }
    }
}

unsafe impl RawCondvar<Mutex> for Condvar {
    #[inline]
    fn init() -> SyncResult<Self> {
        Ok(Condvar {
            inner: UnsafeCell::new(CONDITION_VARIABLE_INIT),
        })
    }

    #[inline]
    fn signal(&self) -> SyncResult {
        unsafe { WakeConditionVariable(self.inner.get()) };
        Ok(())
    }

    #[inline]
    fn broadcast(&self) -> SyncResult {
        unsafe { WakeAllConditionVariable(self.inner.get()) };
        Ok(())
    }

    #[inline]
    unsafe fn wait(&self, mutex: &Mutex) -> SyncResult {
        unsafe { self.sleep(mutex, INFINITE) }
    }

    unsafe fn timed_wait(&self, mutex: &Mutex, deadline: &Deadline) -> SyncResult {
        match unsafe { self.sleep(mutex, millis_until(deadline)) } {
            // Millisecond rounding can wake us early; callers re-check.
            Err(SyncError::TimedOut) if !deadline.has_passed() => Ok(()),
            res => res,
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

    use super::Condvar;
    use crate::SyncError;
    use crate::backend::win32::Mutex;
    use crate::backend::{RawCondvar, RawMutex};
    use crate::time::Deadline;

    #[test]
    fn timed_wait_times_out_holding_the_lock() {
        let m = Mutex::init().unwrap();
        let cv = Condvar::init().unwrap();
        m.lock().unwrap();
        let deadline = Deadline::after(Duration::from_millis(20));
        let mut res = Ok(());
        while res.is_ok() {
            res = unsafe { cv.timed_wait(&m, &deadline) };
        }
        assert_eq!(res, Err(SyncError::TimedOut));
        assert_eq!(m.try_lock(), Err(SyncError::Busy));
        unsafe { m.unlock().unwrap() };
    }
}
