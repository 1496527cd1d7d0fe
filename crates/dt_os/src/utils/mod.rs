//! Small helpers shared by the backends.
//!
//! - [`Backoff`] : Exponential backoff for spin loops, used by the busy-wait
//!   primitives of the portable backend.

// -----------------------------------------------------------------------------
// Modules

mod backoff;

// -----------------------------------------------------------------------------
// Exports

pub use backoff::Backoff;

// -----------------------------------------------------------------------------
// Utils for test

#[cfg(test)]
#[allow(dead_code, reason = "tests")]
pub(crate) mod tests {
    use alloc::boxed::Box;
    use core::{any::Any, panic::AssertUnwindSafe};
    use std::{panic, thread};

    use crate::sync::atomic::{Ordering, fence};

    /// Runs `f`, catching a panic without printing it.
    pub(crate) fn test_unwind_panic<R>(f: impl FnOnce() -> R) -> Result<R, Box<dyn Any + Send>> {
        let prev_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        let result = panic::catch_unwind(AssertUnwindSafe(f));

        panic::set_hook(prev_hook);
        result
    }

    /// Runs `f` on a new standard thread, catching a panic without printing it.
    pub(crate) fn test_thread_panic<F, T>(f: F) -> Result<T, Box<dyn Any + Send>>
    where
        F: FnOnce() -> T,
        F: Send + 'static,
        T: Send + 'static,
    {
        let prev_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        fence(Ordering::SeqCst);
        let result = thread::spawn(f).join();
        panic::set_hook(prev_hook);
        result
    }
}
