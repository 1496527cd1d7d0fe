//! The POSIX backend, on top of pthreads.
//!
//! Every pthread object lives in its own heap allocation so that it never
//! moves after initialization.
//!
//! Linux and Android have timed mutex and rwlock calls; other targets poll.

#![expect(unsafe_code, reason = "Calls into pthreads.")]

use core::ffi::c_int;
use core::mem;
use core::num::NonZero;
use core::time::Duration;
use std::io;

use super::SyncBackend;
use crate::time::Deadline;
use crate::{SyncError, SyncResult};

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
pub use thread::{Thread, ThreadId};
pub use tss::TssKey;

/// Backend marker for pthreads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Posix;

impl SyncBackend for Posix {
    const NAME: &'static str = "posix";

    type Mutex = Mutex;
    type RecursiveMutex = RecursiveMutex;
    type Condvar = Condvar;
    type RwLock = RwLock;
    type Thread = Thread;
    type TssKey = TssKey;

    #[inline]
    fn yield_now() {
        unsafe {
            libc::sched_yield();
        }
    }

    fn sleep(dur: Duration) -> Result<(), Duration> {
        let mut req: libc::timespec = unsafe { mem::zeroed() };
        req.tv_sec = libc::time_t::try_from(dur.as_secs()).unwrap_or(libc::time_t::MAX);
        req.tv_nsec = dur.subsec_nanos() as _;
        let mut rem: libc::timespec = unsafe { mem::zeroed() };

        if unsafe { libc::nanosleep(&req, &mut rem) } == 0 {
            return Ok(());
        }
        match io::Error::last_os_error().raw_os_error() {
            Some(libc::EINTR) => Err(Duration::new(
                u64::try_from(rem.tv_sec).unwrap_or(0),
                u32::try_from(rem.tv_nsec).unwrap_or(0),
            )),
            _ => Err(dur),
        }
    }

    fn hardware_concurrency() -> NonZero<usize> {
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        usize::try_from(n)
            .ok()
            .and_then(NonZero::new)
            .unwrap_or(NonZero::<usize>::MIN)
    }
}

// -----------------------------------------------------------------------------
// Helpers

/// Maps a pthread return code to the result contract.
pub(crate) fn check(code: c_int) -> SyncResult {
    match code {
        0 => Ok(()),
        libc::EBUSY => Err(SyncError::Busy),
        libc::ETIMEDOUT => Err(SyncError::TimedOut),
        libc::ENOMEM | libc::EAGAIN => Err(SyncError::NoMem),
        _ => Err(SyncError::Error),
    }
}

/// The absolute `CLOCK_REALTIME` time of `deadline`.
///
/// Times before the epoch are clamped to it; they have passed either way.
pub(crate) fn timespec(deadline: &Deadline) -> libc::timespec {
    let mut ts: libc::timespec = unsafe { mem::zeroed() };
    if deadline.secs() >= 0 {
        ts.tv_sec = libc::time_t::try_from(deadline.secs()).unwrap_or(libc::time_t::MAX);
        ts.tv_nsec = deadline.nanos() as _;
    }
    ts
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::{Posix, check, timespec};
    use crate::SyncError;
    use crate::backend::SyncBackend;
    use crate::time::Deadline;

    #[test]
    fn errno_mapping() {
        assert_eq!(check(0), Ok(()));
        assert_eq!(check(libc::EBUSY), Err(SyncError::Busy));
        assert_eq!(check(libc::ETIMEDOUT), Err(SyncError::TimedOut));
        assert_eq!(check(libc::ENOMEM), Err(SyncError::NoMem));
        assert_eq!(check(libc::EAGAIN), Err(SyncError::NoMem));
        assert_eq!(check(libc::EINVAL), Err(SyncError::Error));
        assert_eq!(check(libc::EDEADLK), Err(SyncError::Error));
    }

    #[test]
    fn timespec_clamps_before_epoch() {
        let ts = timespec(&Deadline::new(-5, 10).unwrap());
        assert_eq!((ts.tv_sec, ts.tv_nsec), (0, 0));
        let ts = timespec(&Deadline::new(7, 250).unwrap());
        assert_eq!((ts.tv_sec, ts.tv_nsec), (7, 250));
    }

    #[test]
    fn sleeps_and_counts_cpus() {
        let start = std::time::Instant::now();
        assert_eq!(Posix::sleep(Duration::from_millis(20)), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(20));
        Posix::yield_now();
        assert!(Posix::hardware_concurrency().get() >= 1);
        assert_eq!(Posix::NAME, "posix");
    }
}
