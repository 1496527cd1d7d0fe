//! The Win32 backend.
//!
//! Mutexes and reader-writer locks are slim reader/writer locks, condition
//! variables are native, and the recursive mutex is a critical section.
//! Thread-specific storage uses `Tls*` and runs no destructors.

#![expect(unsafe_code, reason = "Calls into Win32.")]

use core::num::NonZero;
use core::time::Duration;

use windows_sys::Win32::Foundation::{
    ERROR_NOT_ENOUGH_MEMORY, ERROR_OUTOFMEMORY, ERROR_TIMEOUT, GetLastError,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows_sys::Win32::System::Threading::{INFINITE, Sleep, SwitchToThread};

use super::SyncBackend;
use crate::SyncError;
use crate::time::Deadline;

// -----------------------------------------------------------------------------
// Modules

mod condvar;
mod mutex;
mod rwlock;
mod thread;
mod tss;

// -----------------------------------------------------------------------------
// Exports

pub use condvar::Condvar;
pub use mutex::{Mutex, RecursiveMutex};
pub use rwlock::RwLock;
pub use thread::Thread;
pub use tss::TssKey;

/// Backend marker for Win32 threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32;

impl SyncBackend for Win32 {
    const NAME: &'static str = "win32";

    type Mutex = Mutex;
    type RecursiveMutex = RecursiveMutex;
    type Condvar = Condvar;
    type RwLock = RwLock;
    type Thread = Thread;
    type TssKey = TssKey;

    #[inline]
    fn yield_now() {
        unsafe {
            SwitchToThread();
        }
    }

    fn sleep(dur: Duration) -> Result<(), Duration> {
        // `Sleep` is not interruptible, long sleeps are split.
        let mut left = dur;
        while !left.is_zero() {
            let ms = millis(left);
            unsafe { Sleep(ms) };
            left = left.saturating_sub(Duration::from_millis(u64::from(ms)));
        }
        Ok(())
    }

    fn hardware_concurrency() -> NonZero<usize> {
        let mut info: SYSTEM_INFO = unsafe { core::mem::zeroed() };
        unsafe { GetSystemInfo(&mut info) };
        NonZero::new(info.dwNumberOfProcessors as usize).unwrap_or(NonZero::<usize>::MIN)
    }
}

// -----------------------------------------------------------------------------
// Helpers

/// Rounds `dur` up to whole milliseconds, below [`INFINITE`].
pub(crate) fn millis(dur: Duration) -> u32 {
    let ms = dur.as_millis() + u128::from(dur.subsec_nanos() % 1_000_000 != 0);
    u32::try_from(ms).unwrap_or(INFINITE - 1).min(INFINITE - 1)
}

/// Milliseconds until `deadline`, rounded up.
#[inline]
pub(crate) fn millis_until(deadline: &Deadline) -> u32 {
    millis(deadline.remaining())
}

/// Maps the calling thread's last error to the result contract.
pub(crate) fn last_error() -> SyncError {
    match unsafe { GetLastError() } {
        ERROR_TIMEOUT => SyncError::TimedOut,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY => SyncError::NoMem,
        _ => SyncError::Error,
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::{Win32, millis};
    use crate::backend::SyncBackend;

    #[test]
    fn millis_round_up() {
        assert_eq!(millis(Duration::ZERO), 0);
        assert_eq!(millis(Duration::from_nanos(1)), 1);
        assert_eq!(millis(Duration::from_micros(1500)), 2);
        assert_eq!(millis(Duration::from_secs(u64::MAX)), u32::MAX - 1);
    }

    #[test]
    fn sleeps_and_counts_cpus() {
        let start = std::time::Instant::now();
        assert_eq!(Win32::sleep(Duration::from_millis(15)), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(15));
        Win32::yield_now();
        assert!(Win32::hardware_concurrency().get() >= 1);
    }
}
