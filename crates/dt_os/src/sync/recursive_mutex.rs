#![expect(unsafe_code, reason = "RecursiveMutex requires unsafe code.")]

use core::{cell::UnsafeCell, fmt, marker::PhantomData, mem::ManuallyDrop, ops::Deref};

use super::NativeRecursiveMutex;
use crate::backend::RawRecursiveMutex;
use crate::{SyncError, SyncResult};

/// A mutex the owning thread may lock again without deadlocking itself.
///
/// Each successful [`lock`](Self::lock) or [`try_lock`](Self::try_lock)
/// returns a guard, and other threads can only acquire the lock once every
/// guard of the owner is gone. Since several guards may coexist on one
/// thread, they only hand out shared references; wrap the value in a
/// [`Cell`](core::cell::Cell) or [`RefCell`](core::cell::RefCell) to mutate
/// it.
///
/// # Examples
///
/// ```
/// use core::cell::Cell;
/// use dt_os::sync::RecursiveMutex;
///
/// let m = RecursiveMutex::new(Cell::new(0)).unwrap();
/// let outer = m.lock().unwrap();
/// let inner = m.lock().unwrap();
/// inner.set(inner.get() + 1);
/// drop(inner);
/// assert_eq!(outer.get(), 1);
/// ```
pub struct RecursiveMutex<T: ?Sized> {
    raw: NativeRecursiveMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RecursiveMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for RecursiveMutex<T> {}

/// One level of ownership of a [`RecursiveMutex`].
#[must_use = "if unused the RecursiveMutex will immediately unlock"]
pub struct RecursiveMutexGuard<'a, T: ?Sized + 'a> {
    lock: &'a RecursiveMutex<T>,
    // Guards must stay on the thread that owns the lock.
    _marker: PhantomData<*const ()>,
}

impl<T> RecursiveMutex<T> {
    /// Creates an unlocked recursive mutex.
    #[inline]
    pub fn new(value: T) -> SyncResult<Self> {
        Ok(RecursiveMutex {
            raw: NativeRecursiveMutex::init()?,
            data: UnsafeCell::new(value),
        })
    }

    /// Consumes the mutex and returns the protected value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RecursiveMutex<T> {
    #[inline]
    fn guard(&self) -> RecursiveMutexGuard<'_, T> {
        RecursiveMutexGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    /// Blocks until the lock is acquired or re-entered by its owner.
    #[inline]
    pub fn lock(&self) -> SyncResult<RecursiveMutexGuard<'_, T>> {
        self.raw.lock()?;
        Ok(self.guard())
    }

    /// Acquires or re-enters the lock if possible, `Err(Busy)` otherwise.
    #[inline]
    pub fn try_lock(&self) -> SyncResult<RecursiveMutexGuard<'_, T>> {
        self.raw.try_lock()?;
        Ok(self.guard())
    }

    /// Returns a mutable reference to the protected value.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RecursiveMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RecursiveMutex");
        match self.try_lock() {
            Ok(guard) => d.field("data", &&*guard),
            Err(SyncError::Busy) => d.field("data", &format_args!("<locked>")),
            Err(_) => d.field("data", &format_args!("<unavailable>")),
        };
        d.finish_non_exhaustive()
    }
}

impl<T: ?Sized> RecursiveMutexGuard<'_, T> {
    /// Releases this level of ownership and reports the platform's answer.
    pub fn unlock(self) -> SyncResult {
        let this = ManuallyDrop::new(self);
        unsafe { this.lock.raw.unlock() }
    }
}

impl<T: ?Sized> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RecursiveMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.lock.raw.unlock() } {
            log::error!("failed to unlock a recursive mutex: {e}");
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RecursiveMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;
    use core::time::Duration;
    use std::sync::{Arc, mpsc::channel};
    use std::thread;

    use super::RecursiveMutex;
    use crate::SyncError;

    #[test]
    fn owner_reenters_others_wait() {
        let m = Arc::new(RecursiveMutex::new(Cell::new(0u32)).unwrap());
        let (tried_tx, tried_rx) = channel();
        let (go_tx, go_rx) = channel::<()>();
        let (done_tx, done_rx) = channel();

        let g1 = m.lock().unwrap();
        let g2 = m.lock().unwrap();
        let g3 = m.try_lock().unwrap();
        g3.set(3);

        let other = {
            let m = m.clone();
            thread::spawn(move || {
                tried_tx.send(m.try_lock().err()).unwrap();
                go_rx.recv().unwrap();
                let g = m.lock().unwrap();
                done_tx.send(g.get()).unwrap();
            })
        };

        // All three levels are still held while the other thread tries.
        assert_eq!(tried_rx.recv().unwrap(), Some(SyncError::Busy));

        drop(g3);
        drop(g2);
        go_tx.send(()).unwrap();
        // still held once
        thread::sleep(Duration::from_millis(50));
        assert!(done_rx.try_recv().is_err());
        g1.unlock().unwrap();

        assert_eq!(done_rx.recv().unwrap(), 3);
        other.join().unwrap();
    }

    #[test]
    fn debug_shows_value() {
        let m = RecursiveMutex::new(7).unwrap();
        assert_eq!(format!("{m:?}"), "RecursiveMutex { data: 7, .. }");
        assert_eq!(m.into_inner(), 7);
    }
}
