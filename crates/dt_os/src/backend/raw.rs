#![expect(unsafe_code, reason = "Raw primitives are unsafe to implement and release.")]

use alloc::boxed::Box;
use core::{ffi::c_void, fmt::Debug, hash::Hash, num::NonZero, time::Duration};

use crate::{SyncResult, time::Deadline};

/// Destructor registered with a [`RawTssKey`].
///
/// Called at thread exit with the thread's non-null value.
pub type TssDtor = unsafe extern "C" fn(*mut c_void);

/// The entry point handed to [`RawThread::spawn`].
pub type ThreadMain = Box<dyn FnOnce() + Send + 'static>;

/// A raw non-recursive mutual exclusion lock.
///
/// A raw lock carries no data and no guard; the safe wrappers in
/// [`crate::sync`] pair it with both.
///
/// # Safety
///
/// Implementations must guarantee that while one call of `lock`, `try_lock`
/// or `timed_lock` has returned `Ok` and the matching `unlock` has not been
/// called, no other such call returns `Ok`.
pub unsafe trait RawMutex: Send + Sync + Sized {
    /// Creates an unlocked mutex (`init`). Dropping it is `destroy`.
    fn init() -> SyncResult<Self>;

    /// Blocks until the lock is acquired.
    fn lock(&self) -> SyncResult;

    /// Acquires the lock if it is free, `Err(Busy)` otherwise.
    fn try_lock(&self) -> SyncResult;

    /// Blocks until the lock is acquired or `deadline` passes (`Err(TimedOut)`).
    fn timed_lock(&self, deadline: &Deadline) -> SyncResult;

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The lock must be held by the current thread.
    unsafe fn unlock(&self) -> SyncResult;
}

/// A raw mutex the owning thread may lock again.
///
/// # Safety
///
/// Same as [`RawMutex`], with ownership counted per thread: other threads
/// cannot acquire it until every successful lock of the owner is unlocked.
pub unsafe trait RawRecursiveMutex: Send + Sync + Sized {
    /// Creates an unlocked mutex.
    fn init() -> SyncResult<Self>;

    /// Blocks until the lock is acquired or re-entered.
    fn lock(&self) -> SyncResult;

    /// Acquires or re-enters the lock if possible, `Err(Busy)` otherwise.
    fn try_lock(&self) -> SyncResult;

    /// Releases one level of ownership.
    ///
    /// # Safety
    ///
    /// The lock must be held by the current thread.
    unsafe fn unlock(&self) -> SyncResult;
}

/// A raw condition variable usable with the mutex type `M`.
///
/// # Safety
///
/// `wait` and `timed_wait` must return with `mutex` locked by the caller on
/// every path that returns `Ok` or `Err(TimedOut)`.
pub unsafe trait RawCondvar<M: RawMutex>: Send + Sync + Sized {
    /// Creates a condition variable with no waiters.
    fn init() -> SyncResult<Self>;

    /// Wakes at least one waiter.
    fn signal(&self) -> SyncResult;

    /// Wakes every waiter.
    fn broadcast(&self) -> SyncResult;

    /// Atomically releases `mutex`, sleeps until woken, re-acquires `mutex`.
    ///
    /// # Safety
    ///
    /// `mutex` must be locked by the current thread.
    unsafe fn wait(&self, mutex: &M) -> SyncResult;

    /// Like [`wait`](Self::wait) but gives up at `deadline` with
    /// `Err(TimedOut)`, still re-acquiring `mutex`.
    ///
    /// # Safety
    ///
    /// `mutex` must be locked by the current thread.
    unsafe fn timed_wait(&self, mutex: &M, deadline: &Deadline) -> SyncResult;
}

/// A raw reader-writer lock.
///
/// The release path is chosen by the caller, which always knows the mode it
/// acquired in.
///
/// # Safety
///
/// A successful write acquisition excludes every other acquisition; a
/// successful read acquisition excludes write acquisitions.
pub unsafe trait RawRwLock: Send + Sync + Sized {
    /// Creates an unlocked lock.
    fn init() -> SyncResult<Self>;

    /// Blocks until shared access is granted.
    fn read(&self) -> SyncResult;

    /// Grants shared access if possible, `Err(Busy)` otherwise.
    fn try_read(&self) -> SyncResult;

    /// Blocks until shared access is granted or `deadline` passes.
    fn timed_read(&self, deadline: &Deadline) -> SyncResult;

    /// Blocks until exclusive access is granted.
    fn write(&self) -> SyncResult;

    /// Grants exclusive access if possible, `Err(Busy)` otherwise.
    fn try_write(&self) -> SyncResult;

    /// Blocks until exclusive access is granted or `deadline` passes.
    fn timed_write(&self, deadline: &Deadline) -> SyncResult;

    /// Releases shared access.
    ///
    /// # Safety
    ///
    /// The current thread must hold shared access.
    unsafe fn unlock_read(&self) -> SyncResult;

    /// Releases exclusive access.
    ///
    /// # Safety
    ///
    /// The current thread must hold exclusive access.
    unsafe fn unlock_write(&self) -> SyncResult;
}

/// A platform thread.
///
/// Exactly one of [`join`](Self::join) and [`detach`](Self::detach) ends the
/// handle; both take it by value.
pub trait RawThread: Send + Sized {
    /// Identity of a thread, comparable across handles.
    type Id: Copy + Eq + Hash + Debug + Send + Sync;

    /// Starts a thread running `main`.
    ///
    /// `main` must not unwind. On failure `main` is dropped on the calling
    /// thread.
    fn spawn(stack_size: Option<usize>, main: ThreadMain) -> SyncResult<Self>;

    /// The identity of this thread.
    fn id(&self) -> Self::Id;

    /// Waits for the thread to finish and releases the handle.
    fn join(self) -> SyncResult;

    /// Releases the handle without waiting.
    fn detach(self) -> SyncResult;

    /// The identity of the calling thread.
    fn current() -> Self::Id;
}

/// A raw thread-specific storage key.
///
/// # Safety
///
/// `get` must return the last value `set` by the calling thread, or null.
pub unsafe trait RawTssKey: Send + Sync + Sized {
    /// `true` if destructors passed to [`create`](Self::create) run at thread exit.
    const RUNS_DESTRUCTORS: bool;

    /// Allocates a key whose value is null on every thread.
    fn create(dtor: Option<TssDtor>) -> SyncResult<Self>;

    /// The calling thread's value, null if unset.
    fn get(&self) -> *mut c_void;

    /// Replaces the calling thread's value.
    fn set(&self, value: *mut c_void) -> SyncResult;

    /// Frees the key. Destructors are not called for values still stored.
    ///
    /// # Safety
    ///
    /// The key must not be used again, by any thread.
    unsafe fn delete(&self) -> SyncResult;
}

/// A set of primitives implemented for one platform.
///
/// [`Native`](super::Native) names the backend selected for the current
/// target.
pub trait SyncBackend: 'static {
    /// Short name of the backend, used in logs.
    const NAME: &'static str;

    type Mutex: RawMutex;
    type RecursiveMutex: RawRecursiveMutex;
    type Condvar: RawCondvar<Self::Mutex>;
    type RwLock: RawRwLock;
    type Thread: RawThread;
    type TssKey: RawTssKey;

    /// Offers the rest of the calling thread's time slice to the scheduler.
    fn yield_now();

    /// Sleeps for `dur`.
    ///
    /// Returns `Err(remaining)` if the sleep was cut short by a signal.
    fn sleep(dur: Duration) -> Result<(), Duration>;

    /// Number of logical CPUs, `1` if it cannot be determined.
    fn hardware_concurrency() -> NonZero<usize>;
}
