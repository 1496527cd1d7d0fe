//! Temporal quantification.
//!
//! Re-exports the standard library's time types and adds [`Deadline`], the
//! absolute point in time every timed operation of this crate is bounded by.
//!
//! See the [standard library](https://doc.rust-lang.org/std/time) for further details.

mod deadline;

pub use core::time::{Duration, TryFromFloatSecsError};
pub use std::time::{Instant, SystemTime, SystemTimeError, UNIX_EPOCH};

pub use deadline::Deadline;
