//! This module contains an atomic pointer-slot patcher

use std::convert::Infallible;
use std::mem;
use std::sync::atomic::{fence, AtomicPtr, Ordering};

use log::{trace, warn};
use thiserror::Error;

use super::{PatchGuard, Patcher, Slot};

/// Errors when patching a slot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// The slot pointer was null
    #[error("slot pointer is null")]
    Null,
    /// The slot is not aligned to pointer width, so a single store could tear
    #[error("slot {0:#x} is not pointer-aligned")]
    Misaligned(usize),
}

/// Checks that `slot` can be accessed with a single atomic pointer store
pub fn check_slot(slot: Slot) -> Result<(), SlotError> {
    if slot.is_null() {
        Err(SlotError::Null)
    } else if slot as usize % mem::align_of::<AtomicPtr<()>>() != 0 {
        Err(SlotError::Misaligned(slot as usize))
    } else {
        Ok(())
    }
}

/// Atomically reads the pointer currently stored at `slot`
///
/// # Safety
///
/// `slot` must be valid for reads, aligned, and only ever written atomically
pub unsafe fn read_slot(slot: Slot) -> *mut () {
    AtomicPtr::from_ptr(slot).load(Ordering::Acquire)
}

/// Stores `value` into `slot` and publishes it to every processor, returning the value it replaced
///
/// # Safety
///
/// `slot` must be valid for reads and writes, aligned, and only ever accessed atomically
unsafe fn publish(slot: Slot, value: *mut ()) -> *mut () {
    let previous = AtomicPtr::from_ptr(slot).swap(value, Ordering::AcqRel);
    // store-ordering barrier: nothing after this point runs before the new pointer is visible
    fence(Ordering::SeqCst);
    previous
}

/// Patcher for pointer slots.
/// Writes are single atomic stores with release ordering followed by a full fence.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlotPatcher;
impl SlotPatcher {
    /// Creates a new [`SlotPatcher`]
    pub fn new() -> Self {
        Self::default()
    }
}
unsafe impl Patcher for SlotPatcher {
    type Error = SlotError;
    type Guard = SlotPatchGuard;

    unsafe fn patch(&self, slot: Slot, value: *mut ()) -> Result<Self::Guard, Self::Error> {
        check_slot(slot)?;
        Ok(SlotPatchGuard::patch(slot, value))
    }
}

/// Guard for slot patches
///
/// See [`SlotPatcher`].
#[derive(Debug)]
pub struct SlotPatchGuard {
    /// Location of the patch
    location: Slot,
    /// Value the slot held before the patch
    original: *mut (),
    /// Value written by the patch
    patched: *mut (),
    /// Set once the original value is back in place
    restored: bool,
}
impl SlotPatchGuard {
    /// Patches a slot, returning a guard for unpatching
    ///
    /// # Safety
    ///
    /// `location` must be a valid, aligned slot
    unsafe fn patch(location: Slot, value: *mut ()) -> Self {
        let original = publish(location, value);
        trace!("slot {:p}: {:p} -> {:p}", location, original, value);
        Self {
            location,
            original,
            patched: value,
            restored: false,
        }
    }
    /// Writes the original value back, once
    fn unpatch(&mut self) {
        if self.restored {
            return;
        }
        // Safety: creator must pass in a `location` that stays valid while we are alive
        let current = unsafe { publish(self.location, self.original) };
        if current != self.patched {
            warn!(
                "slot {:p} held {:p} instead of patched value {:p} at restore",
                self.location, current, self.patched
            );
        }
        trace!("slot {:p}: {:p} -> {:p}", self.location, current, self.original);
        self.restored = true;
    }
}
unsafe impl PatchGuard for SlotPatchGuard {
    type Error = Infallible;

    fn location(&self) -> Slot {
        self.location
    }

    fn original(&self) -> *mut () {
        self.original
    }

    fn restore(&mut self) -> Result<(), Self::Error> {
        self.unpatch();
        Ok(())
    }
}
impl Drop for SlotPatchGuard {
    fn drop(&mut self) {
        self.unpatch();
    }
}

// SAFETY: the guard only touches its slot through atomic operations, and the patch contract keeps the slot alive
unsafe impl Send for SlotPatchGuard {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
    use std::thread;

    use crate::patcher::slot::{check_slot, read_slot, SlotError, SlotPatcher};
    use crate::patcher::{PatchGuard, Patcher};

    /// Stand-in target for the original pointer
    static ORIGINAL: u64 = 1;
    /// Stand-in target for the replacement pointer
    static REPLACEMENT: u64 = 2;

    fn original() -> *mut () {
        &ORIGINAL as *const u64 as *mut ()
    }

    fn replacement() -> *mut () {
        &REPLACEMENT as *const u64 as *mut ()
    }

    #[test]
    /// Test patch and revert functionality
    fn test_patch() {
        let slot = AtomicPtr::new(original());

        // get our patcher to test
        let patcher = SlotPatcher::new();

        // patch the slot
        let mut patch = unsafe { patcher.patch(slot.as_ptr(), replacement()).unwrap() };

        // make sure the slot was actually changed and the old value remembered
        assert_eq!(slot.load(Ordering::SeqCst), replacement());
        assert_eq!(patch.original(), original());
        assert_eq!(patch.location(), slot.as_ptr());

        // restore the patch
        patch.restore().unwrap();

        // make sure the patch was restored
        assert_eq!(slot.load(Ordering::SeqCst), original());
    }

    #[test]
    /// Dropping the guard restores just like `restore`
    fn test_drop_restores() {
        let slot = AtomicPtr::new(original());

        {
            let _patch = unsafe { SlotPatcher::new().patch(slot.as_ptr(), replacement()).unwrap() };
            assert_eq!(unsafe { read_slot(slot.as_ptr()) }, replacement());
        }

        assert_eq!(slot.load(Ordering::SeqCst), original());
    }

    #[test]
    /// Null and misaligned slots are rejected before anything is written
    fn test_bad_slots() {
        assert_eq!(check_slot(std::ptr::null_mut()), Err(SlotError::Null));

        let words = [0usize; 2];
        let misaligned = (words.as_ptr() as usize + 1) as *mut *mut ();
        assert_eq!(
            check_slot(misaligned),
            Err(SlotError::Misaligned(misaligned as usize))
        );
        assert!(unsafe { SlotPatcher::new().patch(misaligned, replacement()) }.is_err());
        assert_eq!(words, [0, 0]);
    }

    #[test]
    /// Readers racing with repeated patch/restore only ever see one of the two pointers
    fn test_concurrent_readers() {
        let slot = AtomicPtr::new(original());
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let mut reads = 0u64;
                        while !done.load(Ordering::Acquire) {
                            let seen = unsafe { read_slot(slot.as_ptr()) };
                            assert!(seen == original() || seen == replacement(), "torn read {seen:p}");
                            reads += 1;
                        }
                        reads
                    })
                })
                .collect();

            let patcher = SlotPatcher::new();
            for _ in 0..10_000 {
                let mut patch = unsafe { patcher.patch(slot.as_ptr(), replacement()).unwrap() };
                patch.restore().unwrap();
            }
            done.store(true, Ordering::Release);

            for reader in readers {
                reader.join().unwrap();
            }
        });

        assert_eq!(slot.load(Ordering::SeqCst), original());
    }
}
