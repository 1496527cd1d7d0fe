//! Native threads and thread-specific storage.
//!
//! [`spawn`] starts a closure on a new platform thread and returns a
//! [`Thread`] handle. Exactly one of [`Thread::join`] and [`Thread::detach`]
//! ends the handle; a handle dropped without either is detached.
//!
//! ```
//! use dt_os::thread;
//!
//! let t = thread::spawn(|| 6 * 7).unwrap();
//! assert_ne!(t.id(), thread::current());
//! assert_eq!(t.join(), Ok(42));
//! ```

// -----------------------------------------------------------------------------
// Modules

mod tss;

// -----------------------------------------------------------------------------
// Exports

pub use crate::backend::TssDtor;
pub use tss::TssKey;

// -----------------------------------------------------------------------------
// Thread

use alloc::boxed::Box;
use core::{any::Any, fmt, num::NonZero, panic::AssertUnwindSafe, time::Duration};
use std::panic;

use crate::backend::{Native, RawThread, SyncBackend, ThreadMain};
use crate::sync::{Arc, Mutex};
use crate::{SyncError, SyncResult};

type NativeThread = <Native as SyncBackend>::Thread;

/// Where a spawned thread leaves its result, `None` if it panicked.
type Packet<T> = Arc<Mutex<Option<T>>>;

/// A unique identifier of a running thread.
///
/// Two ids compare equal exactly when they name the same thread.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(<NativeThread as RawThread>::Id);

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadId").field(&self.0).finish()
    }
}

/// Payload carried by the unwind started in [`exit`].
struct ExitValue<T>(T);

/// Thread factory, which can be used in order to configure the properties of
/// a new thread.
///
/// # Examples
///
/// ```
/// use dt_os::thread::Builder;
///
/// let t = Builder::new()
///     .stack_size(512 * 1024)
///     .spawn(|| "done")
///     .unwrap();
/// assert_eq!(t.join(), Ok("done"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct Builder {
    stack_size: Option<usize>,
}

impl Builder {
    /// Generates the base configuration for spawning a thread.
    #[inline]
    pub const fn new() -> Builder {
        Builder { stack_size: None }
    }

    /// Sets the size of the stack (in bytes) for the new thread.
    ///
    /// The platform may round the size up to its minimum or to a page
    /// multiple.
    #[inline]
    pub const fn stack_size(mut self, size: usize) -> Builder {
        self.stack_size = Some(size);
        self
    }

    /// Spawns a new thread running `f` and returns a handle to it.
    ///
    /// Fails with `NoMem` if the platform ran out of resources, `Error`
    /// otherwise. On failure `f` is dropped without running.
    pub fn spawn<F, T>(self, f: F) -> SyncResult<Thread<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let packet: Packet<T> = Arc::new(Mutex::new(None)?);
        let their_packet = packet.clone();

        let main: ThreadMain = Box::new(move || {
            let value = match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => Some(value),
                Err(payload) => exit_value::<T>(payload),
            };
            match their_packet.lock() {
                Ok(mut slot) => *slot = value,
                Err(e) => log::error!("failed to store a thread result: {e}"),
            }
        });

        let raw = NativeThread::spawn(self.stack_size, main)?;
        let id = ThreadId(raw.id());
        log::trace!("spawned thread {id:?}");
        Ok(Thread {
            raw: Some(raw),
            id,
            packet,
        })
    }
}

/// Recovers the value passed to [`exit`], `None` for a real panic.
fn exit_value<T: 'static>(payload: Box<dyn Any + Send>) -> Option<T> {
    match payload.downcast::<ExitValue<T>>() {
        Ok(exit) => Some(exit.0),
        Err(_) => None,
    }
}

/// Spawns a new thread with the default configuration.
///
/// See [`Builder::spawn`].
#[inline]
pub fn spawn<F, T>(f: F) -> SyncResult<Thread<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Builder::new().spawn(f)
}

/// An owned permission to join on a thread.
///
/// `T` is the value the thread produces, either by returning from its
/// closure or through [`exit`].
pub struct Thread<T> {
    // `None` once joined or detached.
    raw: Option<NativeThread>,
    id: ThreadId,
    packet: Packet<T>,
}

impl<T> Thread<T> {
    /// The identity of the thread.
    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Waits for the thread to finish and returns its value.
    ///
    /// Returns `Err(Error)` if the thread panicked, or if it called [`exit`]
    /// with a value of another type than `T`.
    pub fn join(mut self) -> SyncResult<T> {
        let raw = self.raw.take().ok_or(SyncError::Error)?;
        log::trace!("joining thread {:?}", self.id);
        raw.join()?;
        self.packet.lock()?.take().ok_or(SyncError::Error)
    }

    /// Lets the thread run on its own; its resources are released when it
    /// finishes.
    pub fn detach(mut self) -> SyncResult {
        let raw = self.raw.take().ok_or(SyncError::Error)?;
        log::trace!("detaching thread {:?}", self.id);
        raw.detach()
    }
}

impl<T> Drop for Thread<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            log::debug!("thread {:?} dropped without join, detaching", self.id);
            if let Err(e) = raw.detach() {
                log::error!("failed to detach thread {:?}: {e}", self.id);
            }
        }
    }
}

impl<T> fmt::Debug for Thread<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("id", &self.id).finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Free functions

/// Terminates the calling thread, making `value` its join result.
///
/// The thread's stack is unwound, so destructors of live values run. If the
/// thread was spawned as a `Thread<U>` with `U` other than `T`, joining it
/// reports `Err(Error)`.
///
/// Only meaningful on threads spawned by this module. Elsewhere the unwind
/// behaves like an uncaught panic.
///
/// # Examples
///
/// ```
/// use dt_os::thread;
///
/// let t = thread::spawn(|| -> u32 {
///     thread::exit(7u32);
/// })
/// .unwrap();
/// assert_eq!(t.join(), Ok(7));
/// ```
pub fn exit<T: Send + 'static>(value: T) -> ! {
    panic::resume_unwind(Box::new(ExitValue(value)))
}

/// Returns the identity of the calling thread.
#[inline]
pub fn current() -> ThreadId {
    ThreadId(NativeThread::current())
}

/// Offers the rest of the calling thread's time slice to the scheduler.
#[inline]
pub fn yield_now() {
    Native::yield_now();
}

/// Puts the calling thread to sleep for at least `dur`.
///
/// Returns `Err(remaining)` if a signal cut the sleep short.
#[inline]
pub fn sleep(dur: Duration) -> Result<(), Duration> {
    Native::sleep(dur)
}

/// Returns the number of logical CPUs, at least `1`.
#[inline]
pub fn hardware_concurrency() -> NonZero<usize> {
    Native::hardware_concurrency()
}
