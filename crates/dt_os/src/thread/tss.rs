#![expect(unsafe_code, reason = "Keys hand out raw per-thread pointers.")]

use core::{ffi::c_void, fmt, mem::ManuallyDrop};

use crate::SyncResult;
use crate::backend::{Native, RawTssKey, SyncBackend, TssDtor};

type NativeTssKey = <Native as SyncBackend>::TssKey;

/// A process-wide key to one pointer-sized slot per thread.
///
/// Every thread starts with a null value in the slot. The slot is untyped;
/// what the pointer means is up to the caller.
///
/// Dropping the key deletes it. Values still stored are not destroyed.
///
/// # Examples
///
/// ```
/// use core::ffi::c_void;
/// use dt_os::thread::{self, TssKey};
///
/// let key = std::sync::Arc::new(TssKey::new().unwrap());
/// key.set(1 as *mut c_void).unwrap();
///
/// let k = key.clone();
/// let t = thread::spawn(move || k.get().is_null()).unwrap();
/// assert_eq!(t.join(), Ok(true));
/// assert_eq!(key.get() as usize, 1);
/// ```
pub struct TssKey {
    raw: NativeTssKey,
}

impl TssKey {
    /// `true` if destructors registered with
    /// [`with_destructor`](Self::with_destructor) run on this platform.
    ///
    /// Win32 has no thread-exit hook for its slots.
    pub const RUNS_DESTRUCTORS: bool = NativeTssKey::RUNS_DESTRUCTORS;

    /// Allocates a key without a destructor.
    ///
    /// Fails with `NoMem` when the platform runs out of keys.
    #[inline]
    pub fn new() -> SyncResult<TssKey> {
        Ok(TssKey {
            raw: NativeTssKey::create(None)?,
        })
    }

    /// Allocates a key whose non-null values are passed to `dtor` when their
    /// thread exits.
    ///
    /// Where [`RUNS_DESTRUCTORS`](Self::RUNS_DESTRUCTORS) is `false` the
    /// destructor is ignored with a warning.
    ///
    /// # Safety
    ///
    /// `dtor` is called with every non-null value left in a slot at thread
    /// exit, from that thread, and must be sound for each of them.
    #[inline]
    pub unsafe fn with_destructor(dtor: TssDtor) -> SyncResult<TssKey> {
        Ok(TssKey {
            raw: NativeTssKey::create(Some(dtor))?,
        })
    }

    /// The calling thread's value, null if it never set one.
    #[inline]
    pub fn get(&self) -> *mut c_void {
        self.raw.get()
    }

    /// Replaces the calling thread's value.
    ///
    /// The previous value is not destroyed.
    #[inline]
    pub fn set(&self, value: *mut c_void) -> SyncResult {
        self.raw.set(value)
    }

    /// Deletes the key and reports the platform's answer.
    pub fn delete(self) -> SyncResult {
        let this = ManuallyDrop::new(self);
        // SAFETY: `self` is consumed, so the key cannot be used again.
        unsafe { this.raw.delete() }
    }
}

impl Drop for TssKey {
    fn drop(&mut self) {
        // SAFETY: as in `delete`.
        if let Err(e) = unsafe { self.raw.delete() } {
            log::error!("failed to delete a thread-specific storage key: {e}");
        }
    }
}

impl fmt::Debug for TssKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TssKey").finish_non_exhaustive()
    }
}
