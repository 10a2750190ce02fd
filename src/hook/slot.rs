//! # Slot Hook
//!
//! This hook type swaps the function pointer stored in an operation table slot

use crate::patcher::{PatchGuard, Patcher, Slot};

use super::{Hook, HookGuard};

/// Function-pointer swap hook
pub struct SlotHook<P> {
    /// Underlying patcher to be used to hook
    patcher: P,
}
impl<P: Patcher> SlotHook<P> {
    /// Creates a new slot hook
    pub fn new(patcher: P) -> Self {
        Self { patcher }
    }
}
impl<P: Patcher + Default> Default for SlotHook<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}
unsafe impl<P: Patcher> Hook for SlotHook<P> {
    type Error = P::Error;
    type Guard = SlotHookGuard<P::Guard>;

    unsafe fn hook(&self, slot: Slot, destination: *const ()) -> Result<Self::Guard, Self::Error> {
        // the slot holds the destination's address, nothing else to build
        let patch = self.patcher.patch(slot, destination as *mut ())?;

        Ok(SlotHookGuard::new(patch))
    }
}

/// Guard for slot hooks
pub struct SlotHookGuard<G: PatchGuard> {
    /// Underlying patch guard that we're wrapping
    guard: G,
}
impl<G: PatchGuard> SlotHookGuard<G> {
    /// Creates a new slot hook guard that wraps `guard`
    fn new(guard: G) -> Self {
        Self { guard }
    }
    /// Get the underlying patch guard in case info is needed
    pub fn patch(&self) -> &G {
        &self.guard
    }
}
unsafe impl<G: PatchGuard> HookGuard for SlotHookGuard<G> {
    type Error = G::Error;

    fn slot(&self) -> Slot {
        self.guard.location()
    }

    fn original(&self) -> *mut () {
        self.guard.original()
    }

    fn unhook(&mut self) -> Result<(), Self::Error> {
        self.guard.restore()
    }
}
