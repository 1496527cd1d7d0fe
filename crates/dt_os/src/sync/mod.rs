//! Synchronization primitives over the [native backend](crate::backend::Native).
//!
//! The types here look like the standard library's, with two differences:
//!
//! - Every operation reports the platform's answer as a
//!   [`SyncResult`](crate::SyncResult). Creation can fail with `NoMem`,
//!   non-blocking attempts fail with `Busy`, bounded waits with `TimedOut`.
//! - There is no poisoning. A guard dropped during unwinding simply releases
//!   its lock; only [`OnceFlag`] remembers a routine that unwound.
//!
//! Timed operations take an absolute [`Deadline`](crate::time::Deadline).
//!
//! ## atomic
//!
//! We detect whether atomic operations are available on the target platform.
//! If supported, we use `core::sync::atomic`; otherwise, we fall back to
//! `portable_atomic`.

// -----------------------------------------------------------------------------
// Modules

mod condvar;
mod mutex;
mod once;
mod recursive_mutex;
mod rwlock;

pub mod atomic;

// -----------------------------------------------------------------------------
// Exports

pub use alloc::sync::{Arc, Weak};

pub use condvar::{Condvar, WaitTimeoutResult};
pub use mutex::{Mutex, MutexGuard};
pub use once::OnceFlag;
pub use recursive_mutex::{RecursiveMutex, RecursiveMutexGuard};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// -----------------------------------------------------------------------------
// Native raw types

use crate::backend::{Native, SyncBackend};

pub(crate) type NativeMutex = <Native as SyncBackend>::Mutex;
pub(crate) type NativeRecursiveMutex = <Native as SyncBackend>::RecursiveMutex;
pub(crate) type NativeCondvar = <Native as SyncBackend>::Condvar;
pub(crate) type NativeRwLock = <Native as SyncBackend>::RwLock;
