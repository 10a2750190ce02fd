//! # Hook
//!
//! This module covers hooks, which redirect calls made through a slot to another function

pub mod slot;

use std::fmt::Display;

use crate::patcher::Slot;

/// Trait for hooks
///
/// # Safety
///
/// Hooks are inherently unsafe; it is up to the hook to leave the slot exactly as it found it once unhooked
pub unsafe trait Hook {
    /// Errors that could happen during a hook
    type Error: Display;
    /// Hook guard to allow functions to be automatically unhooked when the guard goes out of scope
    type Guard: HookGuard;

    /// Creates a hook which redirects calls made through `slot` to `destination`.
    ///
    /// # Safety
    ///
    /// - `slot` must be a valid pointer to a function-pointer slot that outlives the guard
    /// - `destination` must be a function with the same signature as the one stored in `slot`
    unsafe fn hook(&self, slot: Slot, destination: *const ()) -> Result<Self::Guard, Self::Error>;
}

/// Guard for a currently active hook
///
/// # Safety
///
/// Must ensure that the guard fully unhooks whether dropped or unhooked via `unhook`
pub unsafe trait HookGuard: Sized {
    /// Errors that could happen while unhooking
    type Error: Display;

    /// Hooked slot
    fn slot(&self) -> Slot;
    /// Function the slot pointed to before it was hooked
    fn original(&self) -> *mut ();
    /// Manually unhooks the hook rather than letting the guard go out of scope.
    ///
    /// A failed unhook leaves the hook in place and may be retried.
    fn unhook(&mut self) -> Result<(), Self::Error>;
}
