#![expect(unsafe_code, reason = "Calls into pthreads.")]

use alloc::boxed::Box;
use core::ffi::c_void;
use core::{mem, ptr};

use super::check;
use crate::backend::{RawThread, ThreadMain};
use crate::{SyncError, SyncResult};

/// Identity of a pthread, compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(libc::pthread_t);

// `pthread_t` is an opaque pointer on some targets; it is only compared.
unsafe impl Send for ThreadId {}
unsafe impl Sync for ThreadId {}

/// A joinable pthread.
#[derive(Debug)]
pub struct Thread {
    native: libc::pthread_t,
}

unsafe impl Send for Thread {}

extern "C" fn thread_start(main: *mut c_void) -> *mut c_void {
    // SAFETY: `spawn` passes ownership of a boxed `ThreadMain`.
    let main = unsafe { Box::from_raw(main.cast::<ThreadMain>()) };
    main();
    ptr::null_mut()
}

/// Rounds a requested stack size up to what pthreads accepts.
fn stack_size_for(requested: usize) -> usize {
    let page = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    };
    let size = requested.max(libc::PTHREAD_STACK_MIN);
    size.div_ceil(page).saturating_mul(page)
}

impl RawThread for Thread {
    type Id = ThreadId;

    fn spawn(stack_size: Option<usize>, main: ThreadMain) -> SyncResult<Self> {
        let mut attr: libc::pthread_attr_t = unsafe { mem::zeroed() };
        check(unsafe { libc::pthread_attr_init(&mut attr) })?;

        let res = match stack_size {
            Some(size) => check(unsafe {
                libc::pthread_attr_setstacksize(&mut attr, stack_size_for(size))
            }),
            None => Ok(()),
        };
        let res = res.and_then(|()| {
            let main = Box::into_raw(Box::new(main));
            let mut native: libc::pthread_t = unsafe { mem::zeroed() };
            let code = unsafe {
                libc::pthread_create(&mut native, &attr, thread_start, main.cast::<c_void>())
            };
            if code == 0 {
                Ok(Thread { native })
            } else {
                // The thread never started, `main` is still ours.
                drop(unsafe { Box::from_raw(main) });
                log::debug!("pthread_create failed with code {code}");
                Err(match check(code) {
                    Err(SyncError::NoMem) => SyncError::NoMem,
                    _ => SyncError::Error,
                })
            }
        });

        unsafe {
            libc::pthread_attr_destroy(&mut attr);
        }
        res
    }

    #[inline]
    fn id(&self) -> ThreadId {
        ThreadId(self.native)
    }

    fn join(self) -> SyncResult {
        check(unsafe { libc::pthread_join(self.native, ptr::null_mut()) })
    }

    fn detach(self) -> SyncResult {
        check(unsafe { libc::pthread_detach(self.native) })
    }

    #[inline]
    fn current() -> ThreadId {
        ThreadId(unsafe { libc::pthread_self() })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;

    use super::{Thread, stack_size_for};
    use crate::backend::RawThread;

    #[test]
    fn stack_sizes_are_page_multiples() {
        let size = stack_size_for(1);
        assert!(size >= libc::PTHREAD_STACK_MIN);
        let size = stack_size_for(1024 * 1024 + 1);
        assert!(size > 1024 * 1024);
        assert_eq!(size % 4096, 0);
    }

    #[test]
    fn spawn_join_and_identity() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = channel();
        let h = hits.clone();
        let t = Thread::spawn(
            Some(512 * 1024),
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
                tx.send(Thread::current()).unwrap();
            }),
        )
        .unwrap();

        let id = t.id();
        assert_ne!(id, Thread::current());
        t.join().unwrap();
        assert_eq!(rx.recv().unwrap(), id);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detached_thread_still_runs() {
        let (tx, rx) = channel();
        let t = Thread::spawn(None, Box::new(move || tx.send(7).unwrap())).unwrap();
        t.detach().unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
    }
}
