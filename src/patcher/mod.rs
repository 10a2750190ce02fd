//! # Patcher
//!
//! This module covers patchers, which are used to overwrite and restore pointer-sized slots in live memory.
//!
//! Patching a slot that other processors read concurrently has two requirements:
//! - the write must be a single pointer-width store so readers see either the old or the new value, never a mix
//! - the store must be published with release ordering and a full fence before the patch call returns, so every processor observes it on its next read
//!
//! Slots hold data pointers, not code, so no instruction cache maintenance is needed.

pub mod mem;
pub mod slot;

use std::fmt::Display;

/// A pointer-sized slot, as seen by the patcher
pub type Slot = *mut *mut ();

/// All patchers save state from where they patched and are able to revert on-command
///
/// # Safety
///
/// Patchers are inherently unsafe. The implementor must ensure that the implementation of `patch` works correctly and is properly documented for avoiding undefined behavior
pub unsafe trait Patcher {
    /// Error type that can occur when patching
    type Error: Display;
    /// Guard type for the patcher. When this guard is dropped, the slot should be restored.
    type Guard: PatchGuard;

    /// Replaces the pointer stored at `slot` with `value`.
    ///
    /// # Safety
    ///
    /// - `slot` must be valid for reads and writes of a pointer for as long as the guard is alive
    /// - every other access to `slot` must be atomic while the guard is alive
    unsafe fn patch(&self, slot: Slot, value: *mut ()) -> Result<Self::Guard, Self::Error>;
}

/// Guard for a patch
///
/// # Safety
///
/// Guard must fully unpatch the slot when dropped, even if `restore` is not called
pub unsafe trait PatchGuard: Sized {
    /// Error type that can occur when restoring
    type Error: Display;

    /// Slot that was patched
    fn location(&self) -> Slot;
    /// Value the slot held right before the patch
    fn original(&self) -> *mut ();
    /// Restores the original value of the slot, reporting failures that dropping would only log.
    ///
    /// On failure the guard stays armed and `restore` can be called again. Once it succeeded, further calls do nothing.
    fn restore(&mut self) -> Result<(), Self::Error>;
}
