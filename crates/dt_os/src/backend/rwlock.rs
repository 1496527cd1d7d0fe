#![expect(unsafe_code, reason = "FallbackRwLock guards its counters with a raw mutex.")]

use core::{cell::UnsafeCell, fmt, marker::PhantomData};

use super::{RawCondvar, RawMutex, RawRwLock};
use crate::{SyncError, SyncResult, time::Deadline};

/// Counters of a [`FallbackRwLock`], as seen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RwLockState {
    /// Threads holding shared access.
    pub readers: usize,
    /// `1` while a thread holds exclusive access, else `0`.
    pub writers: usize,
    /// Threads blocked in a write acquisition.
    pub waiting_writers: usize,
}

/// A writer-preferring reader-writer lock built from one mutex and two
/// condition variables.
///
/// Used by backends without a native reader-writer lock, and usable with any
/// pair of raw primitives.
///
/// # Policy
///
/// Once a writer is waiting, new readers block until it has acquired and
/// released the lock, so a steady stream of readers cannot starve writers.
/// Among themselves, readers and writers are not served in FIFO order.
///
/// # Invariants
///
/// `readers > 0` and `writers == 1` never hold at the same time, and
/// `writers <= 1`.
pub struct FallbackRwLock<M, C> {
    mutex: M,
    readers_cond: C,
    writers_cond: C,
    state: UnsafeCell<RwLockState>,
}

// SAFETY: `state` is only touched while `mutex` is held.
unsafe impl<M: Send, C: Send> Send for FallbackRwLock<M, C> {}
unsafe impl<M: Sync, C: Sync> Sync for FallbackRwLock<M, C> {}

/// Holds the internal mutex; unlocks it on drop.
struct Held<'a, M: RawMutex, C> {
    lock: &'a FallbackRwLock<M, C>,
    _marker: PhantomData<*const ()>,
}

impl<M: RawMutex, C> Held<'_, M, C> {
    #[inline]
    fn state(&mut self) -> &mut RwLockState {
        // SAFETY: the internal mutex is held for the lifetime of `self`, and
        // the returned borrow keeps `self` mutably borrowed.
        unsafe { &mut *self.lock.state.get() }
    }
}

impl<M: RawMutex, C> Drop for Held<'_, M, C> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: `Held` only exists while the internal mutex is held.
        if let Err(e) = unsafe { self.lock.mutex.unlock() } {
            log::error!("FallbackRwLock: releasing the internal mutex failed: {e}");
        }
    }
}

impl<M: RawMutex, C: RawCondvar<M>> FallbackRwLock<M, C> {
    /// Reads the counters.
    pub fn state(&self) -> SyncResult<RwLockState> {
        let mut held = self.hold()?;
        Ok(*held.state())
    }

    #[inline]
    fn hold(&self) -> SyncResult<Held<'_, M, C>> {
        self.mutex.lock()?;
        Ok(Held {
            lock: self,
            _marker: PhantomData,
        })
    }

    fn wait_on(&self, cond: &C, deadline: Option<&Deadline>) -> SyncResult {
        // SAFETY: only called through a live `Held`.
        unsafe {
            match deadline {
                Some(deadline) => cond.timed_wait(&self.mutex, deadline),
                None => cond.wait(&self.mutex),
            }
        }
    }

    fn acquire_read(&self, deadline: Option<&Deadline>) -> SyncResult {
        let mut held = self.hold()?;
        loop {
            let state = held.state();
            if state.writers == 0 && state.waiting_writers == 0 {
                state.readers += 1;
                return Ok(());
            }
            self.wait_on(&self.readers_cond, deadline)?;
        }
    }

    fn acquire_write(&self, deadline: Option<&Deadline>) -> SyncResult {
        let mut held = self.hold()?;
        held.state().waiting_writers += 1;
        loop {
            let state = held.state();
            if state.readers == 0 && state.writers == 0 {
                state.waiting_writers -= 1;
                state.writers += 1;
                return Ok(());
            }
            if let Err(e) = self.wait_on(&self.writers_cond, deadline) {
                self.withdraw_writer(held.state());
                return Err(e);
            }
        }
    }

    /// A waiting writer gives up. Called with the internal mutex held.
    fn withdraw_writer(&self, state: &mut RwLockState) {
        state.waiting_writers -= 1;
        if state.writers != 0 {
            return;
        }
        let res = if state.waiting_writers == 0 {
            // Readers held back by this writer may go.
            self.readers_cond.broadcast()
        } else if state.readers == 0 {
            // A wakeup consumed by this writer must not be lost.
            self.writers_cond.signal()
        } else {
            Ok(())
        };
        if let Err(e) = res {
            log::error!("FallbackRwLock: waking waiters after a timeout failed: {e}");
        }
    }
}

// SAFETY: the counters are only changed with the internal mutex held, and
// acquisition checks `readers == 0 && writers == 0` for writers and
// `writers == 0` for readers.
unsafe impl<M: RawMutex, C: RawCondvar<M>> RawRwLock for FallbackRwLock<M, C> {
    fn init() -> SyncResult<Self> {
        Ok(FallbackRwLock {
            mutex: M::init()?,
            readers_cond: C::init()?,
            writers_cond: C::init()?,
            state: UnsafeCell::new(RwLockState::default()),
        })
    }

    #[inline]
    fn read(&self) -> SyncResult {
        self.acquire_read(None)
    }

    fn try_read(&self) -> SyncResult {
        let mut held = self.hold()?;
        let state = held.state();
        if state.writers == 0 && state.waiting_writers == 0 {
            state.readers += 1;
            Ok(())
        } else {
            Err(SyncError::Busy)
        }
    }

    #[inline]
    fn timed_read(&self, deadline: &Deadline) -> SyncResult {
        self.acquire_read(Some(deadline))
    }

    #[inline]
    fn write(&self) -> SyncResult {
        self.acquire_write(None)
    }

    fn try_write(&self) -> SyncResult {
        let mut held = self.hold()?;
        let state = held.state();
        if state.readers == 0 && state.writers == 0 {
            state.writers += 1;
            Ok(())
        } else {
            Err(SyncError::Busy)
        }
    }

    #[inline]
    fn timed_write(&self, deadline: &Deadline) -> SyncResult {
        self.acquire_write(Some(deadline))
    }

    unsafe fn unlock_read(&self) -> SyncResult {
        let mut held = self.hold()?;
        let state = held.state();
        debug_assert!(state.readers > 0 && state.writers == 0);
        state.readers -= 1;
        if state.readers == 0 && state.waiting_writers > 0 {
            self.writers_cond.signal()?;
        }
        Ok(())
    }

    unsafe fn unlock_write(&self) -> SyncResult {
        let mut held = self.hold()?;
        let state = held.state();
        debug_assert!(state.writers == 1 && state.readers == 0);
        state.writers -= 1;
        if state.waiting_writers > 0 {
            self.writers_cond.signal()
        } else {
            self.readers_cond.broadcast()
        }
    }
}

impl<M: RawMutex, C: RawCondvar<M>> fmt::Debug for FallbackRwLock<M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("FallbackRwLock");
        match self.state() {
            Ok(state) => d.field("state", &state),
            Err(_) => d.field("state", &format_args!("<unavailable>")),
        };
        d.finish_non_exhaustive()
    }
}
