#![expect(unsafe_code, reason = "Destructors are foreign function pointers.")]

use alloc::vec::Vec;
use core::cell::RefCell;
use core::ffi::c_void;
use core::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::{RawTssKey, TssDtor};
use crate::{SyncError, SyncResult};

// -----------------------------------------------------------------------------
// Registry

/// A key slot of the process-wide registry.
#[derive(Clone, Copy)]
struct Entry {
    /// Bumped every time the slot is handed out, so stale values stored
    /// under a deleted key are never seen through a new one.
    generation: u64,
    live: bool,
    dtor: Option<TssDtor>,
}

struct Registry {
    entries: Vec<Entry>,
    free: Vec<usize>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    entries: Vec::new(),
    free: Vec::new(),
});

fn registry() -> MutexGuard<'static, Registry> {
    // The registry is consistent after every statement, poisoning is moot.
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The destructor to run for a value stored under `(index, generation)`.
fn dtor_of(index: usize, generation: u64) -> Option<TssDtor> {
    let reg = registry();
    reg.entries
        .get(index)
        .filter(|e| e.live && e.generation == generation)
        .and_then(|e| e.dtor)
}

// -----------------------------------------------------------------------------
// Per-thread values

#[derive(Clone, Copy)]
struct Slot {
    generation: u64,
    value: *mut c_void,
}

const EMPTY: Slot = Slot {
    generation: 0,
    value: ptr::null_mut(),
};

struct Slots(RefCell<Vec<Slot>>);

impl Drop for Slots {
    fn drop(&mut self) {
        let slots = core::mem::take(self.0.get_mut());
        for (index, slot) in slots.into_iter().enumerate() {
            if slot.value.is_null() {
                continue;
            }
            if let Some(dtor) = dtor_of(index, slot.generation) {
                // SAFETY: the value was stored under a live key registered
                // with this destructor.
                unsafe { dtor(slot.value) };
            }
        }
    }
}

std::thread_local! {
    static SLOTS: Slots = const { Slots(RefCell::new(Vec::new())) };
}

// -----------------------------------------------------------------------------
// TssKey

/// A thread-specific storage key backed by a thread-local table.
///
/// Destructors run once per thread, when the table itself is destroyed at
/// thread exit. Values set from within a destructor are discarded.
#[derive(Debug)]
pub struct TssKey {
    index: usize,
    generation: u64,
}

unsafe impl RawTssKey for TssKey {
    const RUNS_DESTRUCTORS: bool = true;

    fn create(dtor: Option<TssDtor>) -> SyncResult<Self> {
        let mut reg = registry();
        let index = match reg.free.pop() {
            Some(index) => index,
            None => {
                reg.entries.try_reserve(1).map_err(|_| SyncError::NoMem)?;
                reg.entries.push(Entry {
                    generation: 0,
                    live: false,
                    dtor: None,
                });
                reg.entries.len() - 1
            }
        };
        let entry = &mut reg.entries[index];
        entry.generation += 1;
        entry.live = true;
        entry.dtor = dtor;
        Ok(TssKey {
            index,
            generation: entry.generation,
        })
    }

    fn get(&self) -> *mut c_void {
        SLOTS
            .try_with(|slots| {
                slots
                    .0
                    .borrow()
                    .get(self.index)
                    .filter(|s| s.generation == self.generation)
                    .map_or(ptr::null_mut(), |s| s.value)
            })
            .unwrap_or(ptr::null_mut())
    }

    fn set(&self, value: *mut c_void) -> SyncResult {
        SLOTS
            .try_with(|slots| {
                let mut slots = slots.0.try_borrow_mut().map_err(|_| SyncError::Error)?;
                if slots.len() <= self.index {
                    let extra = self.index + 1 - slots.len();
                    slots.try_reserve(extra).map_err(|_| SyncError::NoMem)?;
                    slots.resize(self.index + 1, EMPTY);
                }
                slots[self.index] = Slot {
                    generation: self.generation,
                    value,
                };
                Ok(())
            })
            .map_err(|_| SyncError::Error)?
    }

    unsafe fn delete(&self) -> SyncResult {
        let mut reg = registry();
        let Some(entry) = reg.entries.get_mut(self.index) else {
            return Err(SyncError::Error);
        };
        if !entry.live || entry.generation != self.generation {
            return Err(SyncError::Error);
        }
        entry.live = false;
        entry.dtor = None;
        reg.free.push(self.index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::ffi::c_void;
    use core::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::TssKey;
    use crate::backend::RawTssKey;

    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn count(value: *mut c_void) {
        DROPPED.fetch_add(value as usize, Ordering::SeqCst);
    }

    #[test]
    fn values_are_per_thread() {
        let key = TssKey::create(None).unwrap();
        assert!(key.get().is_null());
        key.set(7 as *mut c_void).unwrap();

        let key_ref = &key;
        thread::scope(|s| {
            s.spawn(move || {
                assert!(key_ref.get().is_null());
                key_ref.set(9 as *mut c_void).unwrap();
                assert_eq!(key_ref.get() as usize, 9);
            });
        });

        assert_eq!(key.get() as usize, 7);
        unsafe { key.delete().unwrap() };
    }

    #[test]
    fn destructor_runs_at_thread_exit() {
        let key = TssKey::create(Some(count)).unwrap();
        let key_ref = &key;
        // Joining explicitly waits for thread-local destruction, the end of
        // the scope alone does not.
        thread::scope(|s| {
            let a = s.spawn(move || key_ref.set(40 as *mut c_void).unwrap());
            let b = s.spawn(move || key_ref.set(2 as *mut c_void).unwrap());
            // a null value is never destroyed
            let c = s.spawn(move || key_ref.set(ptr::null_mut()).unwrap());
            a.join().unwrap();
            b.join().unwrap();
            c.join().unwrap();
        });
        assert_eq!(DROPPED.load(Ordering::SeqCst), 42);
        unsafe { key.delete().unwrap() };
    }

    #[test]
    fn recycled_key_starts_empty() {
        let first = TssKey::create(None).unwrap();
        first.set(5 as *mut c_void).unwrap();
        let index = first.index;
        unsafe { first.delete().unwrap() };
        assert!(unsafe { first.delete() }.is_err());

        let second = TssKey::create(None).unwrap();
        if second.index == index {
            assert!(second.generation > first.generation);
        }
        assert!(second.get().is_null());
        unsafe { second.delete().unwrap() };
    }
}
