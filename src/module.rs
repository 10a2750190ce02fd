//! # Module
//!
//! Load and unload entry points for the host's module lifecycle.
//!
//! [`on_load`] returns the status the host loader expects: `0` on success, a negative errno that aborts the load otherwise.
//! [`on_unload`] never fails from the host's point of view; problems are logged.

use std::ffi::c_int;
use std::sync::{Mutex, PoisonError};

use log::{error, info, warn};

use crate::controller::InterceptionController;
use crate::error::HookError;
use crate::platform;
use crate::symbol::Resolver;

/// A loaded interception
pub struct Module<R: Resolver> {
    /// Controller holding the slot
    controller: InterceptionController<R>,
}
impl<R: Resolver> Module<R> {
    /// Checks the platform and activates the interception
    pub fn load(resolver: R) -> Result<Self, HookError> {
        info!("loading...");
        platform::check()?;
        let controller = InterceptionController::new(resolver);
        controller.activate()?;
        Ok(Self { controller })
    }
    /// Deactivates the interception
    pub fn unload(self) -> Result<(), HookError> {
        self.controller.deactivate()
    }
    /// Controller holding the slot
    pub fn controller(&self) -> &InterceptionController<R> {
        &self.controller
    }
}

/// Type-erased [`Module`], so the loaded instance can live in a static whatever resolver the host supplied
trait Unload: Send {
    /// See [`Module::unload`]
    fn unload(self: Box<Self>) -> Result<(), HookError>;
}
impl<R: Resolver + Send> Unload for Module<R> {
    fn unload(self: Box<Self>) -> Result<(), HookError> {
        (*self).unload()
    }
}

/// Module loaded by [`on_load`]
static LOADED: Mutex<Option<Box<dyn Unload>>> = Mutex::new(None);

/// Load callback
pub fn on_load<R: Resolver + Send + 'static>(resolver: R) -> c_int {
    let mut loaded = LOADED.lock().unwrap_or_else(PoisonError::into_inner);
    if loaded.is_some() {
        warn!("already loaded");
        return HookError::AlreadyActive.errno();
    }
    match Module::load(resolver) {
        Ok(module) => {
            *loaded = Some(Box::new(module));
            0
        }
        Err(e) => {
            error!("load failed: {}", e);
            e.errno()
        }
    }
}

/// Unload callback
pub fn on_unload() {
    let module = LOADED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match module {
        Some(module) => match module.unload() {
            Ok(()) => info!("unloaded"),
            Err(e) => error!("unload failed: {}", e),
        },
        None => warn!("unload without a successful load"),
    }
}
