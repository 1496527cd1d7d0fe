#![expect(unsafe_code, reason = "Calls into Win32.")]

use alloc::boxed::Box;
use core::ffi::c_void;
use core::ptr;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows_sys::Win32::System::Threading::{
    CreateThread, GetCurrentThreadId, INFINITE, STACK_SIZE_PARAM_IS_A_RESERVATION,
    WaitForSingleObject,
};

use super::last_error;
use crate::backend::{RawThread, ThreadMain};
use crate::{SyncError, SyncResult};

/// A Win32 thread handle and its id.
#[derive(Debug)]
pub struct Thread {
    handle: HANDLE,
    id: u32,
}

unsafe impl Send for Thread {}

unsafe extern "system" fn thread_start(main: *mut c_void) -> u32 {
    // SAFETY: `spawn` passes ownership of a boxed `ThreadMain`.
    let main = unsafe { Box::from_raw(main.cast::<ThreadMain>()) };
    main();
    0
}

impl Thread {
    fn close(&self) -> SyncResult {
        if unsafe { CloseHandle(self.handle) } != 0 {
            Ok(())
        } else {
            Err(SyncError::Error)
        }
    }
}

impl RawThread for Thread {
    type Id = u32;

    fn spawn(stack_size: Option<usize>, main: ThreadMain) -> SyncResult<Self> {
        let main = Box::into_raw(Box::new(main));
        let mut id = 0;
        let handle = unsafe {
            CreateThread(
                ptr::null(),
                stack_size.unwrap_or(0),
                Some(thread_start),
                main.cast::<c_void>(),
                STACK_SIZE_PARAM_IS_A_RESERVATION,
                &mut id,
            )
        };
        if handle.is_null() {
            let err = last_error();
            // The thread never started, `main` is still ours.
            drop(unsafe { Box::from_raw(main) });
            log::debug!("CreateThread failed: {err}");
            return Err(match err {
                SyncError::NoMem => SyncError::NoMem,
                _ => SyncError::Error,
            });
        }
        Ok(Thread { handle, id })
    }

    #[inline]
    fn id(&self) -> u32 {
        self.id
    }

    fn join(self) -> SyncResult {
        let waited = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        let closed = self.close();
        if waited != WAIT_OBJECT_0 {
            return Err(SyncError::Error);
        }
        closed
    }

    #[inline]
    fn detach(self) -> SyncResult {
        self.close()
    }

    #[inline]
    fn current() -> u32 {
        unsafe { GetCurrentThreadId() }
    }
}
