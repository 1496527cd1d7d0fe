#![expect(unsafe_code, reason = "RwLock requires unsafe code.")]

use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    panic::{RefUnwindSafe, UnwindSafe},
    ptr::NonNull,
};

use super::NativeRwLock;
use crate::backend::RawRwLock;
use crate::time::Deadline;
use crate::{SyncError, SyncResult};

/// A reader-writer lock protecting a value of type `T`.
///
/// Any number of readers or one writer hold the lock at a time, never both.
/// Read access is [`RwLockReadGuard`], write access [`RwLockWriteGuard`];
/// each releases the lock in the mode it was acquired in.
///
/// Writer preference depends on the backend: the portable fallback and
/// glibc never let new readers in while a writer waits.
///
/// # Examples
///
/// ```
/// use dt_os::SyncError;
/// use dt_os::sync::RwLock;
///
/// let lock = RwLock::new(5).unwrap();
/// {
///     let r1 = lock.read().unwrap();
///     let r2 = lock.read().unwrap();
///     assert_eq!(*r1 + *r2, 10);
///     assert_eq!(lock.try_write().err(), Some(SyncError::Busy));
/// }
/// *lock.write().unwrap() += 1;
/// assert_eq!(lock.into_inner(), 6);
/// ```
pub struct RwLock<T: ?Sized> {
    raw: NativeRwLock,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}
impl<T: ?Sized> UnwindSafe for RwLock<T> {}
impl<T: ?Sized> RefUnwindSafe for RwLock<T> {}

/// Shared access to the value of a [`RwLock`].
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockReadGuard<'a, T: ?Sized + 'a> {
    // `NonNull` is covariant over `T`, like `&T`.
    data: NonNull<T>,
    raw: &'a NativeRwLock,
    _marker: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for RwLockReadGuard<'_, T> {}

/// Exclusive access to the value of a [`RwLock`].
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockWriteGuard<'a, T: ?Sized + 'a> {
    lock: &'a RwLock<T>,
    _marker: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for RwLockWriteGuard<'_, T> {}

impl<T> RwLock<T> {
    /// Creates an unlocked reader-writer lock.
    #[inline]
    pub fn new(value: T) -> SyncResult<Self> {
        Ok(RwLock {
            raw: NativeRwLock::init()?,
            data: UnsafeCell::new(value),
        })
    }

    /// Consumes the lock and returns the protected value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwLock<T> {
    #[inline]
    fn read_guard(&self) -> RwLockReadGuard<'_, T> {
        RwLockReadGuard {
            // SAFETY: `UnsafeCell::get` never returns null.
            data: unsafe { NonNull::new_unchecked(self.data.get()) },
            raw: &self.raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn write_guard(&self) -> RwLockWriteGuard<'_, T> {
        RwLockWriteGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    /// Blocks until shared access is granted.
    #[inline]
    pub fn read(&self) -> SyncResult<RwLockReadGuard<'_, T>> {
        self.raw.read()?;
        Ok(self.read_guard())
    }

    /// Grants shared access if possible, `Err(Busy)` otherwise.
    #[inline]
    pub fn try_read(&self) -> SyncResult<RwLockReadGuard<'_, T>> {
        self.raw.try_read()?;
        Ok(self.read_guard())
    }

    /// Blocks until shared access is granted or `deadline` passes.
    #[inline]
    pub fn timed_read(&self, deadline: &Deadline) -> SyncResult<RwLockReadGuard<'_, T>> {
        self.raw.timed_read(deadline)?;
        Ok(self.read_guard())
    }

    /// Blocks until exclusive access is granted.
    #[inline]
    pub fn write(&self) -> SyncResult<RwLockWriteGuard<'_, T>> {
        self.raw.write()?;
        Ok(self.write_guard())
    }

    /// Grants exclusive access if possible, `Err(Busy)` otherwise.
    #[inline]
    pub fn try_write(&self) -> SyncResult<RwLockWriteGuard<'_, T>> {
        self.raw.try_write()?;
        Ok(self.write_guard())
    }

    /// Blocks until exclusive access is granted or `deadline` passes.
    ///
    /// A writer that gives up no longer holds back readers.
    #[inline]
    pub fn timed_write(&self, deadline: &Deadline) -> SyncResult<RwLockWriteGuard<'_, T>> {
        self.raw.timed_write(deadline)?;
        Ok(self.write_guard())
    }

    /// Returns a mutable reference to the protected value.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RwLock");
        match self.try_read() {
            Ok(guard) => d.field("data", &&*guard),
            Err(SyncError::Busy) => d.field("data", &format_args!("<locked>")),
            Err(_) => d.field("data", &format_args!("<unavailable>")),
        };
        d.finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Guards

impl<T: ?Sized> RwLockReadGuard<'_, T> {
    /// Releases shared access and reports the platform's answer.
    pub fn unlock(self) -> SyncResult {
        let this = ManuallyDrop::new(self);
        unsafe { this.raw.unlock_read() }
    }
}

impl<T: ?Sized> RwLockWriteGuard<'_, T> {
    /// Releases exclusive access and reports the platform's answer.
    pub fn unlock(self) -> SyncResult {
        let this = ManuallyDrop::new(self);
        unsafe { this.lock.raw.unlock_write() }
    }
}

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.data.as_ref() }
    }
}

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockReadGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.raw.unlock_read() } {
            log::error!("failed to release a read lock: {e}");
        }
    }
}

impl<T: ?Sized> Drop for RwLockWriteGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.lock.raw.unlock_write() } {
            log::error!("failed to release a write lock: {e}");
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::sync::{Arc, Barrier, mpsc::channel};
    use std::thread;

    use super::RwLock;
    use crate::SyncError;
    use crate::time::Deadline;

    // Five readers take the lock together and all see each other inside.
    #[test]
    fn five_concurrent_readers() {
        const READERS: usize = 5;
        let lock = Arc::new(RwLock::new(42).unwrap());
        let inside = Arc::new(Barrier::new(READERS));

        let handles: Vec<_> = (0..READERS)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    let g = lock.read().unwrap();
                    // Deadlocks unless all readers hold the lock at once.
                    inside.wait();
                    assert_eq!(*g, 42);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn modes_exclude_each_other() {
        let lock = Arc::new(RwLock::new(Vec::new()).unwrap());
        let w = lock.write().unwrap();

        let other = lock.clone();
        let res = thread::spawn(move || {
            (
                other.try_read().err(),
                other.timed_read(&Deadline::after(Duration::from_millis(20))).err(),
                other.try_write().err(),
            )
        })
        .join()
        .unwrap();
        assert_eq!(
            res,
            (Some(SyncError::Busy), Some(SyncError::TimedOut), Some(SyncError::Busy))
        );

        w.unlock().unwrap();
        lock.write().unwrap().push(1);
        let r = lock.read().unwrap();
        assert_eq!(*r, [1]);
        assert_eq!(format!("{lock:?}"), "RwLock { data: [1], .. }");
        r.unlock().unwrap();
    }

    #[test]
    fn timed_write_on_read_locked() {
        let lock = Arc::new(RwLock::new(()).unwrap());
        let r = lock.read().unwrap();
        let other = lock.clone();
        let res = thread::spawn(move || {
            other.timed_write(&Deadline::after(Duration::from_millis(30))).err()
        })
        .join()
        .unwrap();
        assert_eq!(res, Some(SyncError::TimedOut));
        drop(r);
        let w = lock.timed_write(&Deadline::after(Duration::from_secs(1))).unwrap();
        w.unlock().unwrap();
    }

    // Backends whose lock never admits new readers while a writer waits.
    #[cfg(any(
        feature = "fallback",
        all(target_os = "linux", target_env = "gnu"),
        not(any(unix, windows))
    ))]
    #[test]
    fn waiting_writer_goes_before_late_readers() {
        const READERS: usize = 5;

        let lock = Arc::new(RwLock::new(()).unwrap());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let release = Arc::new(Barrier::new(READERS + 1));
        let (ready_tx, ready_rx) = channel();

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let lock = lock.clone();
                let release = release.clone();
                let ready_tx = ready_tx.clone();
                thread::spawn(move || {
                    let g = lock.read().unwrap();
                    ready_tx.send(()).unwrap();
                    release.wait();
                    drop(g);
                })
            })
            .collect();
        for _ in 0..READERS {
            ready_rx.recv().unwrap();
        }

        let (writing_tx, writing_rx) = channel();
        let writer = {
            let lock = lock.clone();
            let order = order.clone();
            thread::spawn(move || {
                writing_tx.send(()).unwrap();
                let _g = lock.write().unwrap();
                order.lock().unwrap().push("writer");
            })
        };
        writing_rx.recv().unwrap();

        // Once the writer queues up, new readers are turned away.
        let deadline = Deadline::after(Duration::from_secs(10));
        loop {
            match lock.try_read() {
                Err(SyncError::Busy) => break,
                Ok(g) => drop(g),
                Err(e) => panic!("unexpected {e}"),
            }
            assert!(!deadline.has_passed(), "writer never started waiting");
            thread::sleep(Duration::from_millis(1));
        }

        let late_reader = {
            let lock = lock.clone();
            let order = order.clone();
            thread::spawn(move || {
                let _g = lock.read().unwrap();
                order.lock().unwrap().push("reader");
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(order.lock().unwrap().is_empty());
        assert_eq!(lock.try_read().err(), Some(SyncError::Busy));

        release.wait();
        for r in readers {
            r.join().unwrap();
        }
        writer.join().unwrap();
        late_reader.join().unwrap();
        assert_eq!(*order.lock().unwrap(), ["writer", "reader"]);
    }
}
