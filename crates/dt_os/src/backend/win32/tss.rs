#![expect(unsafe_code, reason = "Calls into Win32.")]

use core::ffi::c_void;

use windows_sys::Win32::System::Threading::{
    TLS_OUT_OF_INDEXES, TlsAlloc, TlsFree, TlsGetValue, TlsSetValue,
};

use crate::backend::{RawTssKey, TssDtor};
use crate::{SyncError, SyncResult};

/// A `Tls*` slot index.
///
/// Win32 has no per-slot destructors; a destructor passed at creation is
/// dropped with a warning.
#[derive(Debug)]
pub struct TssKey {
    index: u32,
}

unsafe impl RawTssKey for TssKey {
    const RUNS_DESTRUCTORS: bool = false;

    fn create(dtor: Option<TssDtor>) -> SyncResult<Self> {
        if dtor.is_some() {
            log::warn!("thread-specific storage destructors are not run on win32");
        }
        let index = unsafe { TlsAlloc() };
        if index == TLS_OUT_OF_INDEXES {
            return Err(SyncError::NoMem);
        }
        Ok(TssKey { index })
    }

    #[inline]
    fn get(&self) -> *mut c_void {
        unsafe { TlsGetValue(self.index) }
    }

    #[inline]
    fn set(&self, value: *mut c_void) -> SyncResult {
        if unsafe { TlsSetValue(self.index, value) } != 0 {
            Ok(())
        } else {
            Err(SyncError::Error)
        }
    }

    unsafe fn delete(&self) -> SyncResult {
        if unsafe { TlsFree(self.index) } != 0 {
            Ok(())
        } else {
            Err(SyncError::Error)
        }
    }
}
