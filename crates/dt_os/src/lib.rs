#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

// -----------------------------------------------------------------------------
// Compilation config

/// Some macros used for compilation control.
///
/// Exactly one of `posix`, `win32` and `portable` is active. It names the
/// backend behind [`backend::Native`].
pub mod cfg {
    pub(crate) use dt_cfg::switch;

    dt_cfg::define_alias! {
        #[cfg(all(unix, not(feature = "fallback")))] => posix,
        #[cfg(all(windows, not(feature = "fallback")))] => win32,
        #[cfg(any(feature = "fallback", not(any(unix, windows))))] => portable,
    }
}

// -----------------------------------------------------------------------------
// Allocation

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod error;

pub mod backend;
pub mod sync;
pub mod thread;
pub mod time;
pub mod utils;

// -----------------------------------------------------------------------------
// Exports

pub use error::{Status, SyncError, SyncResult};
