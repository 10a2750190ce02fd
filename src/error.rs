//! Errors surfaced by the interception lifecycle

use std::ffi::c_int;

use thiserror::Error;

use crate::host::{EBUSY, EFAULT, EINVAL, ENODEV, ENOENT};
use crate::platform::PlatformError;
use crate::symbol::ResolveError;

/// Errors from activating or deactivating the interception.
///
/// Failures of the intercepted function itself are not represented here: they reach the caller untouched.
#[derive(Debug, Error)]
pub enum HookError {
    /// The operation table's symbol is not exported by the running system
    #[error(transparent)]
    NotFound(#[from] ResolveError),
    /// The slot was empty, so there is nothing to forward to or restore
    #[error("slot of `{0}` is empty")]
    NoOriginal(&'static str),
    /// An interception is already installed
    #[error("interception already active")]
    AlreadyActive,
    /// No interception is installed
    #[error("interception not active")]
    NotActive,
    /// The platform check failed
    #[error(transparent)]
    Unsupported(#[from] PlatformError),
    /// The slot could not be written
    #[error("writing slot: {0}")]
    Slot(String),
}
impl HookError {
    /// Negative errno reported to the host loader
    pub fn errno(&self) -> c_int {
        let errno = match self {
            Self::NotFound(_) | Self::NoOriginal(_) => ENOENT,
            Self::AlreadyActive => EBUSY,
            Self::NotActive => EINVAL,
            Self::Unsupported(_) => ENODEV,
            Self::Slot(_) => EFAULT,
        };
        -errno
    }
}
