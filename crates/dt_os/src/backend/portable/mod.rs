//! The portable backend.
//!
//! Built on atomics and the standard library. Locks are busy-wait
//! primitives that back off and yield, and the rwlock is [`FallbackRwLock`]
//! over them. Thread-specific storage is a thread-local table whose key
//! registry sits behind a `std::sync::Mutex`.
//!
//! [`OnceFlag`](crate::sync::OnceFlag) parks on the standard library's
//! mutex and condvar under every backend, this one included.
//!
//! It is always compiled so it can be tested next to the native backend,
//! and becomes [`Native`](super::Native) on targets without one or with the
//! `fallback` feature.

use core::num::NonZero;
use core::time::Duration;

use super::{FallbackRwLock, SyncBackend};

// -----------------------------------------------------------------------------
// Modules

mod condvar;
mod mutex;
mod thread;
mod tss;

// -----------------------------------------------------------------------------
// Exports

pub use condvar::Condvar;
pub use mutex::{Mutex, RecursiveMutex};
pub use thread::Thread;
pub use tss::TssKey;

/// The writer-preferring rwlock over the portable mutex and condvar.
pub type RwLock = FallbackRwLock<Mutex, Condvar>;

/// Backend marker for the portable primitives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Portable;

impl SyncBackend for Portable {
    const NAME: &'static str = "portable";

    type Mutex = Mutex;
    type RecursiveMutex = RecursiveMutex;
    type Condvar = Condvar;
    type RwLock = RwLock;
    type Thread = Thread;
    type TssKey = TssKey;

    #[inline]
    fn yield_now() {
        std::thread::yield_now();
    }

    #[inline]
    fn sleep(dur: Duration) -> Result<(), Duration> {
        // The standard library resumes interrupted sleeps itself.
        std::thread::sleep(dur);
        Ok(())
    }

    fn hardware_concurrency() -> NonZero<usize> {
        std::thread::available_parallelism().unwrap_or(NonZero::<usize>::MIN)
    }
}
