//! Atomic types used by the primitives of this crate.
//!
//! If the target platform lacks a native atomic of some width, the type comes
//! from `portable_atomic` instead. Only the widths this crate relies on are
//! provided; atomic pointers are required.
//!
//! See the [standard library](https://doc.rust-lang.org/core/sync/atomic) for
//! further details.

pub use atomic_8::{AtomicBool, AtomicU8};
pub use atomic_32::AtomicU32;
pub use core::sync::atomic::{AtomicUsize, Ordering, fence};

#[cfg(target_has_atomic = "8")]
use core::sync::atomic as atomic_8;

#[cfg(not(target_has_atomic = "8"))]
use portable_atomic as atomic_8;

#[cfg(target_has_atomic = "32")]
use core::sync::atomic as atomic_32;

#[cfg(not(target_has_atomic = "32"))]
use portable_atomic as atomic_32;

#[cfg(not(target_has_atomic = "ptr"))]
compile_error!("Platforms without atomic pointers are currently not supported.");
