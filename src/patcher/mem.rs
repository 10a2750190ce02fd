//! This module contains a patcher which adjusts memory permissions to patch slots in read-only data
//!
//! Operation tables are usually `const` and end up in read-only sections, so writing to their slots needs the page made writable first.
//! Such a page may also hold code, so write access is added to whatever the page already allows rather than replacing it.

use std::mem;

use log::error;
use region::{Protection, ProtectGuard};
use thiserror::Error;

use super::{PatchGuard, Patcher, Slot};

/// Errors when using permission patching
#[derive(Debug, Error)]
pub enum PermissionError<E> {
    /// Error when setting memory protections
    #[error("Error setting memory protections")]
    ProtectionError(#[from] region::Error),
    /// Custom error type from the underlying patcher
    #[error("{0}")]
    CustomError(E),
}

/// Size of the region made writable around a slot
const SLOT_LEN: usize = mem::size_of::<*mut ()>();

/// Adds write access to the page holding `slot` until the returned handle is dropped, which puts the old protection back
///
/// # Safety
///
/// `slot` must be a mapped, pointer-aligned slot
unsafe fn make_writable(slot: Slot) -> Result<ProtectGuard, region::Error> {
    let current = region::query(slot)?.protection();
    region::protect_with_handle(slot, SLOT_LEN, current | Protection::WRITE)
}

/// This struct wraps patchers to allow them to write to memory that's normally unwritable.
/// It achieves this result by adding write access to the page holding the slot, triggering the patch, and then reverting the permissions.
/// Restoring does the same.
///
/// Other processors are unaffected by the permission change, since the page keeps every access it had throughout.
pub struct PermissionWrapper<P: Patcher> {
    /// Underlying patcher.
    patcher: P,
}
impl<P: Patcher> PermissionWrapper<P> {
    /// Creates a new PermissionWrapper
    pub fn new(patcher: P) -> Self {
        Self { patcher }
    }
}
impl<P: Patcher + Default> Default for PermissionWrapper<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

unsafe impl<P: Patcher> Patcher for PermissionWrapper<P> {
    type Error = PermissionError<P::Error>;
    type Guard = PermissionWrapperGuard<P::Guard>;

    unsafe fn patch(&self, slot: Slot, value: *mut ()) -> Result<Self::Guard, Self::Error> {
        let _guard = make_writable(slot)?;
        self.patcher
            .patch(slot, value)
            .map(PermissionWrapperGuard::guard)
            .map_err(PermissionError::CustomError)
    }
}

/// Permission guard for the underlying patch guard
pub struct PermissionWrapperGuard<G: PatchGuard> {
    /// Underlying patch guard for the wrapped patcher. `Option` so that [`Drop::drop`] can give it up when the slot cannot be made writable
    guard: Option<G>,
}
impl<G: PatchGuard> PermissionWrapperGuard<G> {
    /// Wrap a patcher's guard. When this guard is dropped, the underlying guard will also be dropped with its slot made writable
    fn guard(guard: G) -> Self {
        Self { guard: Some(guard) }
    }
    /// Restores the underlying guard with the slot's page writable. On error the underlying guard is untouched.
    fn unpatch(&mut self) -> Result<(), PermissionError<G::Error>> {
        let Some(guard) = self.guard.as_mut() else {
            return Ok(());
        };
        // Safety: the slot was valid when the patch was made and the patch contract keeps it alive
        let _protection = unsafe { make_writable(guard.location()) }?;
        guard.restore().map_err(PermissionError::CustomError)
    }
}
unsafe impl<G: PatchGuard> PatchGuard for PermissionWrapperGuard<G> {
    type Error = PermissionError<G::Error>;

    fn location(&self) -> Slot {
        self.guard
            .as_ref()
            .map_or(std::ptr::null_mut(), PatchGuard::location)
    }

    fn original(&self) -> *mut () {
        self.guard
            .as_ref()
            .map_or(std::ptr::null_mut(), PatchGuard::original)
    }

    fn restore(&mut self) -> Result<(), Self::Error> {
        self.unpatch()
    }
}
impl<G: PatchGuard> Drop for PermissionWrapperGuard<G> {
    fn drop(&mut self) {
        if let Err(e) = self.unpatch() {
            error!("failed to restore slot: {}", e);
            // writing now would fault, so leave the patch in place rather than crash the host
            if let Some(guard) = self.guard.take() {
                mem::forget(guard);
            }
        }
    }
}
