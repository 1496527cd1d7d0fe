//! Platform backends.
//!
//! Every backend implements [`SyncBackend`]: one raw type per primitive, with
//! the same result contract. The safe types in [`crate::sync`] and
//! [`crate::thread`] are written against [`Native`], the backend selected for
//! the current target:
//!
//! | alias      | backend                | selected when                              |
//! |------------|------------------------|--------------------------------------------|
//! | `posix`    | [`posix::Posix`]       | `cfg(unix)`                                |
//! | `win32`    | [`win32::Win32`]       | `cfg(windows)`                             |
//! | `portable` | [`portable::Portable`] | other targets, or the `fallback` feature   |
//!
//! The portable backend is always compiled; it only relies on the standard
//! library's threads and is built from busy-wait primitives plus
//! [`FallbackRwLock`].
//!
//! ## Capability gaps
//!
//! - Timed mutex and rwlock acquisition falls back to polling with a short
//!   sleep where the platform has no timed call.
//! - SRWLOCK cannot tell shared from exclusive release, so the release mode
//!   is always supplied by the caller.
//! - Win32 thread-specific storage runs no destructors.

// -----------------------------------------------------------------------------
// Modules

mod raw;
mod rwlock;

pub mod portable;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod win32;

// -----------------------------------------------------------------------------
// Exports

pub use raw::{
    RawCondvar, RawMutex, RawRecursiveMutex, RawRwLock, RawThread, RawTssKey, SyncBackend,
    ThreadMain, TssDtor,
};
pub use rwlock::{FallbackRwLock, RwLockState};

crate::cfg::switch! {
    crate::cfg::posix => {
        /// The backend selected for the current target.
        pub type Native = posix::Posix;
    }
    crate::cfg::win32 => {
        /// The backend selected for the current target.
        pub type Native = win32::Win32;
    }
    _ => {
        /// The backend selected for the current target.
        pub type Native = portable::Portable;
    }
}

// -----------------------------------------------------------------------------
// Busy-wait fallback

use core::time::Duration;

use crate::{SyncError, SyncResult, time::Deadline};

/// Sleep between two attempts of [`poll_until`].
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Emulates a timed acquisition with a non-blocking one.
///
/// Retries `try_acquire` while it reports `Busy`, sleeping about a
/// millisecond in between, until it succeeds, fails otherwise, or `deadline`
/// passes. Always tries at least once.
pub(crate) fn poll_until(
    deadline: &Deadline,
    mut try_acquire: impl FnMut() -> SyncResult,
) -> SyncResult {
    loop {
        match try_acquire() {
            Err(SyncError::Busy) => {}
            res => return res,
        }
        let left = deadline.remaining();
        if left.is_zero() {
            return Err(SyncError::TimedOut);
        }
        std::thread::sleep(left.min(POLL_INTERVAL));
    }
}
