//! # Symbol
//!
//! This module covers resolvers, which turn the name of an exported kernel entity into its current address

pub mod kallsyms;
pub mod table;

use std::fmt;
use std::ptr::NonNull;

use thiserror::Error;

pub use kallsyms::Kallsyms;
pub use table::SymbolTable;

/// Errors when resolving a symbol
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The name is not in the running system's symbol set
    #[error("symbol `{0}` not found")]
    NotFound(String),
}

/// Address of a resolved symbol.
///
/// Addresses are only meaningful while the image that defines the symbol stays loaded,
/// so they should be resolved again for every activation instead of being cached.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(NonNull<u8>);
impl Address {
    /// Creates an address from a raw pointer, returning `None` for null
    pub fn new<T>(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr as *mut u8).map(Self)
    }
    /// Creates an address from an integer, returning `None` for zero
    pub fn from_usize(addr: usize) -> Option<Self> {
        Self::new(addr as *mut u8)
    }
    /// Raw pointer to the symbol, cast to the requested type
    pub fn as_ptr<T>(self) -> *mut T {
        self.0.as_ptr() as _
    }
    /// Integer value of the address
    pub fn as_usize(self) -> usize {
        self.0.as_ptr() as usize
    }
}
impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:p})", self.0)
    }
}
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0)
    }
}

// SAFETY: an `Address` is an opaque number; dereferencing it is always behind an `unsafe` call site
unsafe impl Send for Address {}
unsafe impl Sync for Address {}

/// Looks up names in a live symbol registry owned by the host
pub trait Resolver {
    /// Returns the current address of `name`, or [`ResolveError::NotFound`] if the running system does not export it
    fn resolve(&self, name: &str) -> Result<Address, ResolveError>;
}

/// Any `Fn(&str) -> Option<Address>` works as a resolver, which is the shape of the host's lookup routine
impl<F> Resolver for F
where
    F: Fn(&str) -> Option<Address>,
{
    fn resolve(&self, name: &str) -> Result<Address, ResolveError> {
        self(name).ok_or_else(|| ResolveError::NotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Address, ResolveError, Resolver};

    #[test]
    /// Null pointers are not addresses
    fn test_null_address() {
        assert!(Address::from_usize(0).is_none());
        assert!(Address::new(std::ptr::null_mut::<u8>()).is_none());

        let addr = Address::from_usize(0x1000).unwrap();
        assert_eq!(addr.as_usize(), 0x1000);
        assert_eq!(addr.as_ptr::<u32>() as usize, 0x1000);
    }

    #[test]
    /// Closures act as lookups
    fn test_closure_resolver() {
        let lookup = |name: &str| {
            if name == "present" {
                Address::from_usize(0xdead_0000)
            } else {
                None
            }
        };

        assert_eq!(lookup.resolve("present").unwrap().as_usize(), 0xdead_0000);
        assert_eq!(
            lookup.resolve("absent"),
            Err(ResolveError::NotFound("absent".into()))
        );
    }
}
