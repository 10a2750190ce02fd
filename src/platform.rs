//! Runtime check of the platform assumptions the slot patching relies on

use std::thread;

use log::{debug, info};
use thiserror::Error;

/// Architectures whose table slots are pointer-aligned words written with a single store
pub const SUPPORTED_ARCHES: &[&str] = &["x86", "x86_64", "arm", "aarch64", "riscv64"];

/// Reasons the platform cannot host the interception
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Slot layout and store atomicity have not been checked for this architecture
    #[error("unsupported architecture `{0}`")]
    UnsupportedArch(&'static str),
    /// Pointer-width atomics are missing, so slot writes could tear
    #[error("architecture `{0}` has no pointer-width atomics")]
    NoPointerAtomics(&'static str),
    /// 32-bit ARM older than ARMv7, where barrier instructions are not available
    #[error("`{0}` needs ARMv7 or later")]
    UnsupportedRevision(&'static str),
}

/// What the check found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Target architecture
    pub arch: &'static str,
    /// Processors available to the host, 1 if unknown
    pub cpus: usize,
}

/// Checks the running platform, failing closed
pub fn check() -> Result<Platform, PlatformError> {
    check_arch(
        std::env::consts::ARCH,
        cfg!(target_has_atomic = "ptr"),
        cfg!(target_feature = "v7"),
    )?;
    let cpus = thread::available_parallelism().map_or(1, usize::from);
    let platform = Platform {
        arch: std::env::consts::ARCH,
        cpus,
    };
    if cpus > 1 {
        info!("{} with {} processors, slot writes use release stores and a full fence", platform.arch, cpus);
    } else {
        debug!("{} with a single processor", platform.arch);
    }
    Ok(platform)
}

/// Architecture half of [`check`]. `armv7` only matters for 32-bit ARM.
fn check_arch(arch: &'static str, pointer_atomics: bool, armv7: bool) -> Result<(), PlatformError> {
    if !SUPPORTED_ARCHES.contains(&arch) {
        return Err(PlatformError::UnsupportedArch(arch));
    }
    if arch == "arm" && !armv7 {
        return Err(PlatformError::UnsupportedRevision(arch));
    }
    if !pointer_atomics {
        return Err(PlatformError::NoPointerAtomics(arch));
    }
    Ok(())
}
