use std::io;
use std::thread::{self, JoinHandle, ThreadId};

use crate::backend::{RawThread, ThreadMain};
use crate::{SyncError, SyncResult};

/// A thread of the standard library.
#[derive(Debug)]
pub struct Thread {
    handle: JoinHandle<()>,
}

/// Maps a failed spawn to the result contract.
fn spawn_error(err: &io::Error) -> SyncError {
    match err.kind() {
        io::ErrorKind::OutOfMemory | io::ErrorKind::WouldBlock => SyncError::NoMem,
        _ => SyncError::Error,
    }
}

impl RawThread for Thread {
    type Id = ThreadId;

    fn spawn(stack_size: Option<usize>, main: ThreadMain) -> SyncResult<Self> {
        let mut builder = thread::Builder::new();
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        match builder.spawn(main) {
            Ok(handle) => Ok(Thread { handle }),
            Err(e) => {
                log::debug!("thread spawn failed: {e}");
                Err(spawn_error(&e))
            }
        }
    }

    #[inline]
    fn id(&self) -> ThreadId {
        self.handle.thread().id()
    }

    fn join(self) -> SyncResult {
        // `main` never unwinds, so an error here is a platform failure.
        self.handle.join().map_err(|_| SyncError::Error)
    }

    #[inline]
    fn detach(self) -> SyncResult {
        drop(self.handle);
        Ok(())
    }

    #[inline]
    fn current() -> ThreadId {
        thread::current().id()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Thread, spawn_error};
    use crate::SyncError;
    use crate::backend::RawThread;

    #[test]
    fn join_waits_for_main() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let t = Thread::spawn(Some(256 * 1024), Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert_ne!(t.id(), Thread::current());
        t.join().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_map_to_nomem() {
        let e = io::Error::from(io::ErrorKind::WouldBlock);
        assert_eq!(spawn_error(&e), SyncError::NoMem);
        let e = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(spawn_error(&e), SyncError::Error);
    }
}
