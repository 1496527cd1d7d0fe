#![expect(unsafe_code, reason = "Calls into pthreads.")]

use core::ffi::c_void;

use super::check;
use crate::SyncResult;
use crate::backend::{RawTssKey, TssDtor};

/// A `pthread_key_t`.
///
/// Destructors are run by the C library at thread exit, for threads of any
/// origin.
#[derive(Debug)]
pub struct TssKey {
    key: libc::pthread_key_t,
}

unsafe impl RawTssKey for TssKey {
    const RUNS_DESTRUCTORS: bool = true;

    fn create(dtor: Option<TssDtor>) -> SyncResult<Self> {
        let mut key: libc::pthread_key_t = 0;
        check(unsafe { libc::pthread_key_create(&mut key, dtor) })?;
        Ok(TssKey { key })
    }

    #[inline]
    fn get(&self) -> *mut c_void {
        unsafe { libc::pthread_getspecific(self.key) }
    }

    #[inline]
    fn set(&self, value: *mut c_void) -> SyncResult {
        check(unsafe { libc::pthread_setspecific(self.key, value) })
    }

    unsafe fn delete(&self) -> SyncResult {
        check(unsafe { libc::pthread_key_delete(self.key) })
    }
}
