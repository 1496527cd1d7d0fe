#![expect(unsafe_code, reason = "Raw primitives require unsafe code.")]

use core::cell::Cell;
use core::fmt;

use crate::backend::{RawMutex, RawRecursiveMutex, poll_until};
use crate::sync::atomic::AtomicBool;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use crate::time::Deadline;
use crate::utils::Backoff;
use crate::{SyncError, SyncResult};

// -----------------------------------------------------------------------------
// Mutex

/// A user level spin-lock without any resources.
///
/// Waiting threads spin with [`Backoff`] and then yield; nothing is
/// allocated, so creation never fails.
///
/// # Examples
///
/// ```
/// use dt_os::backend::RawMutex;
/// use dt_os::backend::portable::Mutex;
///
/// let mutex = Mutex::new();
/// assert!(mutex.try_lock().is_ok());
/// assert!(mutex.try_lock().is_err());
/// unsafe { mutex.unlock().unwrap() };
/// assert!(!mutex.is_locked());
/// ```
pub struct Mutex {
    state: AtomicBool,
}

impl Mutex {
    /// Creates an unlocked `Mutex`.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }

    /// Returns `true` if the mutex is locked.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.state.load(Acquire)
    }

    #[inline]
    fn acquire(&self) -> bool {
        self.state
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_ok()
    }
}

unsafe impl RawMutex for Mutex {
    #[inline]
    fn init() -> SyncResult<Self> {
        Ok(Self::new())
    }

    fn lock(&self) -> SyncResult {
        let backoff = Backoff::new();
        loop {
            if self.acquire() {
                return Ok(());
            }

            if self.state.load(Relaxed) {
                // Held: wait for the owner.
                backoff.snooze();
            } else {
                // Free again: another waiter won the race, retry soon.
                backoff.spin();
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> SyncResult {
        if self.acquire() {
            Ok(())
        } else {
            Err(SyncError::Busy)
        }
    }

    fn timed_lock(&self, deadline: &Deadline) -> SyncResult {
        poll_until(deadline, || self.try_lock())
    }

    #[inline(always)]
    unsafe fn unlock(&self) -> SyncResult {
        self.state.store(false, Release);
        Ok(())
    }
}

impl Default for Mutex {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// RecursiveMutex

std::thread_local! {
    static OWNER_TOKEN: u8 = const { 0 };
}

/// A non-zero value unique to the calling thread among living threads.
#[inline]
fn owner_token() -> usize {
    OWNER_TOKEN.with(|t| core::ptr::from_ref(t) as usize)
}

/// A mutex the owning thread may lock again, built on [`Mutex`].
///
/// The owner is recorded as the address of a thread-local, and the
/// recursion depth is only touched by the owner.
pub struct RecursiveMutex {
    inner: Mutex,
    owner: AtomicUsize,
    depth: Cell<usize>,
}

// SAFETY: `depth` is only accessed by the thread that holds `inner`.
unsafe impl Sync for RecursiveMutex {}

impl RecursiveMutex {
    /// Creates an unlocked `RecursiveMutex`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(),
            owner: AtomicUsize::new(0),
            depth: Cell::new(0),
        }
    }

    /// Re-enters the lock if the calling thread already owns it.
    ///
    /// `None` means the caller is not the owner.
    #[inline]
    fn reenter(&self, me: usize) -> Option<SyncResult> {
        // Only the owner can observe its own token here.
        if self.owner.load(Relaxed) != me {
            return None;
        }
        Some(match self.depth.get().checked_add(1) {
            Some(depth) => {
                self.depth.set(depth);
                Ok(())
            }
            None => Err(SyncError::Error),
        })
    }

    #[inline]
    fn take_ownership(&self, me: usize) {
        self.owner.store(me, Relaxed);
        self.depth.set(1);
    }
}

unsafe impl RawRecursiveMutex for RecursiveMutex {
    #[inline]
    fn init() -> SyncResult<Self> {
        Ok(Self::new())
    }

    fn lock(&self) -> SyncResult {
        let me = owner_token();
        if let Some(res) = self.reenter(me) {
            return res;
        }
        self.inner.lock()?;
        self.take_ownership(me);
        Ok(())
    }

    fn try_lock(&self) -> SyncResult {
        let me = owner_token();
        if let Some(res) = self.reenter(me) {
            return res;
        }
        self.inner.try_lock()?;
        self.take_ownership(me);
        Ok(())
    }

    unsafe fn unlock(&self) -> SyncResult {
        if self.owner.load(Relaxed) != owner_token() {
            return Err(SyncError::Error);
        }
        let depth = self.depth.get() - 1;
        self.depth.set(depth);
        if depth == 0 {
            self.owner.store(0, Relaxed);
            // SAFETY: the calling thread owns `inner`.
            unsafe { self.inner.unlock() }
        } else {
            Ok(())
        }
    }
}

impl Default for RecursiveMutex {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecursiveMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveMutex")
            .field("locked", &self.inner.is_locked())
            .finish_non_exhaustive()
    }
}
